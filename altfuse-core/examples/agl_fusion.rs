//! Sonar / Barometer Altitude Fusion Example
//!
//! A driver thread runs the filter at a 1 ms cadence against a fixed ground
//! truth while a display thread prints the published snapshots next to the
//! raw sensor readings.
//!
//! ## What You'll Learn
//!
//! - Building the altitude filter from sensor standard deviations
//! - Driving it with a periodic task that publishes snapshots
//! - Reading estimates from another thread without sharing the filter
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example agl_fusion
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use altfuse_core::{
    fusion::altitude::{baro, sonar, AglModel},
    FusionTask, Snapshot,
};
use heapless::spsc::Queue;

/// Ground truth altitude (cm)
const GROUND_TRUTH: f64 = 1_000_000.0;
/// Barometer standard deviation (Pa)
const SIGMA_BARO: f64 = 10.0;
/// Sonar standard deviation (cm)
const SIGMA_SONAR: f64 = 0.2;
const CYCLES: u32 = 2000;
const PRINT_EVERY: u32 = 100;

fn main() {
    println!("AltFuse Sonar / Barometer Fusion Example");
    println!("========================================\n");
    println!("Ground truth: {GROUND_TRUTH} cm");
    println!("Barometer σ = {SIGMA_BARO} Pa, sonar σ = {SIGMA_SONAR} cm\n");

    let ekf = match AglModel::default().filter(0.0, SIGMA_BARO, SIGMA_SONAR) {
        Ok(ekf) => ekf,
        Err(e) => {
            eprintln!("Failed to build filter: {e}");
            return;
        }
    };

    let mut queue: Queue<Snapshot, 64> = Queue::new();
    let (producer, mut consumer) = queue.split();
    let done = AtomicBool::new(false);

    let z = [baro(GROUND_TRUTH), sonar(GROUND_TRUTH)];

    thread::scope(|s| {
        let done = &done;

        let driver = s.spawn(move || {
            let mut task = FusionTask::new(ekf, producer);
            for _ in 0..CYCLES {
                if let Err(e) = task.tick(&z) {
                    eprintln!("cycle {} failed: {e}", task.cycles());
                }
                thread::sleep(Duration::from_millis(1));
            }
            done.store(true, Ordering::Release);
            task
        });

        s.spawn(move || {
            println!(
                "{:>6}  {:>12}  {:>12}  {:>12}  {:>10}",
                "cycle", "sonar", "fused", "baro", "σ (cm)"
            );
            loop {
                match consumer.dequeue() {
                    Some(snapshot) if snapshot.update_count % PRINT_EVERY == 0 => {
                        let variance = snapshot.variance(0).unwrap_or(f64::NAN);
                        println!(
                            "{:>6}  {:>12.3}  {:>12.3}  {:>12.3}  {:>10.4}",
                            snapshot.update_count,
                            z[1],
                            snapshot.state[0],
                            z[0],
                            variance.sqrt(),
                        );
                    }
                    Some(_) => {}
                    None if done.load(Ordering::Acquire) => break,
                    None => thread::sleep(Duration::from_micros(200)),
                }
            }
        });

        let task = match driver.join() {
            Ok(task) => task,
            Err(_) => {
                eprintln!("driver thread panicked");
                done.store(true, Ordering::Release);
                return;
            }
        };

        let ekf = task.filter();
        println!("\nFinal estimate: {:.3} cm", ekf.state()[0]);
        println!("Final variance: {:.6} cm²", ekf.covariance()[(0, 0)]);
        println!(
            "Cycles: {}, failures: {}, dropped snapshots: {}",
            task.cycles(),
            task.failures(),
            task.dropped()
        );
    });
}
