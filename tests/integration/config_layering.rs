//! Config layering: defaults, global file, workspace files, then environment.

use super::test_utils::with_xdg_env;
use ferry::config::{global_config_path, ConfigLoader};
use ferry::executor::FailurePolicy;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(path: &std::path::Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[test]
fn workspace_overrides_global_and_env_overrides_both() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let config = with_xdg_env(&temp, || {
        let global = global_config_path().unwrap();
        assert_eq!(global, temp.path().join("config/ferry/config.toml"));
        write(
            &global,
            "[client]\ntimeout_secs = 30\npoll_interval_ms = 40\n\n[host]\ntick_ms = 20\n",
        );
        write(
            &workspace.join(".ferry/config.toml"),
            "[client]\ntimeout_secs = 60\n\n[host]\nfailure_policy = \"abort\"\n",
        );

        std::env::set_var("FERRY__CLIENT__TIMEOUT_SECS", "7");
        let loaded = ConfigLoader::load(&workspace);
        std::env::remove_var("FERRY__CLIENT__TIMEOUT_SECS");
        loaded.unwrap()
    });

    assert_eq!(config.client.timeout_secs, 7);
    assert_eq!(config.client.poll_interval_ms, 40);
    assert_eq!(config.host.tick_ms, 20);
    assert_eq!(config.host.failure_policy, FailurePolicy::Abort);
    assert_eq!(config.paths.queue_dir, PathBuf::from(".ferry/queue"));
}

#[test]
fn environment_specific_workspace_file_wins_over_base() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    write(
        &workspace.join(".ferry/config.toml"),
        "[paths]\nqueue_dir = \"inbox\"\n",
    );
    write(
        &workspace.join(".ferry/ci.toml"),
        "[paths]\nqueue_dir = \"ci-inbox\"\n",
    );

    let config = with_xdg_env(&temp, || {
        std::env::set_var("FERRY_ENV", "ci");
        let loaded = ConfigLoader::load(&workspace);
        std::env::remove_var("FERRY_ENV");
        loaded.unwrap()
    });

    assert_eq!(config.paths.queue_dir, PathBuf::from("ci-inbox"));
    assert_eq!(
        config.paths.resolve(&workspace).queue_dir,
        workspace.join("ci-inbox")
    );
}

#[test]
fn invalid_layer_is_reported_not_ignored() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    write(
        &workspace.join(".ferry/config.toml"),
        "[paths]\nqueue_dir = \"same\"\narchive_dir = \"same\"\n",
    );

    let result = with_xdg_env(&temp, || ConfigLoader::load(&workspace));
    let err = result.unwrap_err().to_string();
    assert!(err.contains("Configuration error"), "{}", err);
}
