#![allow(dead_code)]

use std::time::Duration;

pub fn ms(num: u64) -> Duration {
    Duration::from_millis(num)
}

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}
