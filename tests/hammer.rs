mod support;
use support::*;

use rand::Rng;
use timewheel::Wheel;

use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

#[test]
fn hammer_complete() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 500;
    const MIN_DELAY: u64 = 1;
    const MAX_DELAY: u64 = 500;

    init_log();

    let wheel = Wheel::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let mut producers = Vec::new();
    for _ in 0..THREADS {
        let wheel = wheel.clone();
        let fired = fired.clone();
        let barrier = barrier.clone();

        producers.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            barrier.wait();

            for _ in 0..PER_THREAD {
                let delay = rng.gen_range(MIN_DELAY..MAX_DELAY);
                let count = fired.clone();
                wheel.after(ms(delay), move || {
                    count.fetch_add(1, SeqCst);
                });
            }
        }));
    }

    for producer in producers {
        producer.join().unwrap();
    }

    let expected = THREADS * PER_THREAD;
    let deadline = Instant::now() + ms(MAX_DELAY + 3_000);
    while fired.load(SeqCst) < expected && Instant::now() < deadline {
        thread::sleep(ms(10));
    }
    assert_eq!(fired.load(SeqCst), expected);
}

#[test]
fn hammer_cancel() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 500;
    const MIN_DELAY: u64 = 20;
    const MAX_DELAY: u64 = 300;

    init_log();

    let wheel = Wheel::new();
    let executed = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let mut producers = Vec::new();
    for _ in 0..THREADS {
        let wheel = wheel.clone();
        let executed = executed.clone();
        let stopped = stopped.clone();
        let barrier = barrier.clone();

        producers.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            barrier.wait();

            for i in 0..PER_THREAD {
                let delay = rng.gen_range(MIN_DELAY..MAX_DELAY);
                let count = executed.clone();
                let timer = wheel.after(ms(delay), move || {
                    count.fetch_add(1, SeqCst);
                });

                // Try to take every other timer back; the firing and the stop
                // race, and exactly one of them wins.
                if i % 2 == 0 && timer.stop() {
                    stopped.fetch_add(1, SeqCst);
                }
            }
        }));
    }

    for producer in producers {
        producer.join().unwrap();
    }

    let total = THREADS * PER_THREAD;
    let expected = total - stopped.load(SeqCst);

    let deadline = Instant::now() + ms(MAX_DELAY + 3_000);
    while executed.load(SeqCst) < expected && Instant::now() < deadline {
        thread::sleep(ms(10));
    }

    // Every timer either fired or was stopped, never both, never neither.
    assert_eq!(executed.load(SeqCst), expected);
}

#[test]
fn stop_races_with_demotion() {
    const ROUNDS: usize = 100;

    init_log();

    // A tiny wheel so timers get demoted across levels constantly.
    let wheel = Wheel::builder().tick(ms(1)).size(4).build();

    for _ in 0..ROUNDS {
        let delay = rand::thread_rng().gen_range(5..30u64);

        let executed = Arc::new(AtomicBool::new(false));
        let flag = executed.clone();
        let timer = wheel.after(ms(delay), move || {
            flag.store(true, SeqCst);
        });

        let stopper = {
            let timer = timer.clone();
            thread::spawn(move || {
                let pause = rand::thread_rng().gen_range(0..40u64);
                thread::sleep(ms(pause));
                timer.stop()
            })
        };

        let won = stopper.join().unwrap();

        // Give a claimed firing time to finish.
        thread::sleep(ms(60));

        if won {
            assert!(
                !executed.load(SeqCst),
                "stop returned true but the task executed"
            );
        } else {
            assert!(
                executed.load(SeqCst),
                "stop returned false but the task never executed"
            );
        }
    }
}
