//! End-to-end scenario 6 (`spec.md` §8): a bounded FIFO work queue with
//! `HWM=4, LWM=2` blocks a producer once full, and unblocks it once a slow
//! consumer drains the queue down to the low watermark.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taskwell::queue::{Bounded, WorkQueue};

#[test]
fn producer_blocks_at_high_watermark_and_unblocks_at_low_watermark() {
    let queue = Arc::new(Bounded::<i32>::new(4, 2));
    for i in 0..4 {
        queue.try_put(i).unwrap();
    }
    assert!(queue.try_put(4).is_err(), "queue must never exceed the high watermark");

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        producer_queue.put(100).unwrap();
        producer_queue.put(101).unwrap();
    });

    // Give the producer a chance to actually block on a full queue before
    // the consumer starts draining it.
    thread::sleep(Duration::from_millis(50));

    // Drain down to the low watermark (two items), which wakes the blocked
    // producer.
    assert_eq!(queue.try_take(), Some(0));
    assert_eq!(queue.try_take(), Some(1));

    producer.join().unwrap();

    let mut drained = Vec::new();
    while let Some(v) = queue.try_take() {
        drained.push(v);
    }
    assert_eq!(drained, vec![2, 3, 100, 101]);
}
