//! Property-based tests for dispatcher ordering

use ferry::dispatch::AffinityDispatcher;
use proptest::prelude::*;

/// Items drained across any number of passes run in exactly their enqueue order.
#[test]
fn test_enqueue_order_preserved_across_drains() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &prop::collection::vec(any::<bool>(), 0..64),
            |drain_after| {
                let dispatcher = AffinityDispatcher::<Vec<usize>>::new();
                let handle = dispatcher.handle();
                let mut host = Vec::new();

                for (i, drain_now) in drain_after.iter().enumerate() {
                    handle
                        .enqueue(format!("item-{}", i), move |log: &mut Vec<usize>| {
                            log.push(i);
                            Ok(())
                        })
                        .unwrap();
                    if *drain_now {
                        dispatcher.drain(&mut host);
                    }
                }
                dispatcher.drain(&mut host);

                let expected: Vec<usize> = (0..drain_after.len()).collect();
                prop_assert_eq!(host, expected);
                prop_assert_eq!(dispatcher.pending(), 0);
                Ok(())
            },
        )
        .unwrap();
}

/// With several producer threads, each producer's items keep their relative order.
#[test]
fn test_per_producer_order_with_concurrent_producers() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(1usize..5, 1usize..40), |(producers, per_producer)| {
            let dispatcher = AffinityDispatcher::<Vec<(usize, usize)>>::new();
            let threads: Vec<_> = (0..producers)
                .map(|p| {
                    let handle = dispatcher.handle();
                    std::thread::spawn(move || {
                        for n in 0..per_producer {
                            handle
                                .enqueue("producer", move |log: &mut Vec<(usize, usize)>| {
                                    log.push((p, n));
                                    Ok(())
                                })
                                .unwrap();
                        }
                    })
                })
                .collect();

            let mut host = Vec::new();
            for thread in threads {
                dispatcher.drain(&mut host);
                thread.join().unwrap();
            }
            dispatcher.drain(&mut host);

            prop_assert_eq!(host.len(), producers * per_producer);
            for p in 0..producers {
                let seen: Vec<usize> = host
                    .iter()
                    .filter(|(producer, _)| *producer == p)
                    .map(|(_, n)| *n)
                    .collect();
                prop_assert_eq!(seen, (0..per_producer).collect::<Vec<_>>());
            }
            Ok(())
        })
        .unwrap();
}

/// A failing item never prevents later items in the same pass from running.
#[test]
fn test_failures_do_not_block_the_pass() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(any::<bool>(), 1..32), |fails| {
            let dispatcher = AffinityDispatcher::<Vec<usize>>::new();
            let handle = dispatcher.handle();
            for (i, fail) in fails.iter().copied().enumerate() {
                handle
                    .enqueue("maybe-fail", move |log: &mut Vec<usize>| {
                        log.push(i);
                        if fail {
                            Err(ferry::error::DispatchError::ItemFailed(format!("item {}", i)))
                        } else {
                            Ok(())
                        }
                    })
                    .unwrap();
            }

            let mut host = Vec::new();
            let report = dispatcher.drain(&mut host);
            prop_assert_eq!(report.executed, fails.len());
            prop_assert_eq!(report.failed, fails.iter().filter(|f| **f).count());
            prop_assert_eq!(host.len(), fails.len());
            Ok(())
        })
        .unwrap();
}
