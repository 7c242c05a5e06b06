use compass_calibration::{
    Accuracy, CompassDriver, DriverSettings, FileStore, SharedCalibration, SmoothingSettings,
};
use std::thread;
use std::time::Duration;

const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Raw counts from a sensor with 0.15 µT per count
fn read_counts(i: usize) -> [i32; 3] {
    let z = 1.0 - (2.0 * (i % 64) as f64 + 1.0) / 64.0;
    let r = (1.0 - z * z).sqrt();
    let theta = GOLDEN_ANGLE * i as f64;
    let field = [
        12.0 + 45.0 * r * theta.cos() / 1.05,
        -30.0 + 45.0 * r * theta.sin() / 0.96,
        4.0 + 45.0 * z,
    ];
    field.map(|v| (v / 0.15).round() as i32)
}

fn main() {
    let mut settings = DriverSettings {
        smoothing: Some(SmoothingSettings::default()),
        ..Default::default()
    };
    settings.axes.gain = [100.0 / 0.15; 3];

    let path = std::env::temp_dir().join("compass-calibration-demo.cal");
    let mut store = FileStore::new(&path);

    let shared = SharedCalibration::new();
    let mut driver = CompassDriver::new(settings)
        .expect("valid settings")
        .with_publisher(shared.clone());

    // A reader thread, e.g. persistence or IPC, only ever sees whole snapshots
    let reader = thread::spawn(move || {
        for _ in 0..5 {
            let snapshot = shared.snapshot();
            println!("reader: calibrated = {}", snapshot.calibrated);
            thread::sleep(Duration::from_millis(2));
        }
    });

    driver.enable(&mut store);
    for i in 0..200 {
        let reading = driver.feed_counts(read_counts(i), i as i64 * 50);
        if reading.accuracy == Accuracy::High && i % 20 == 0 {
            println!(
                "[{:>5} ms] {:7.2} {:7.2} {:7.2} µT",
                reading.t_ms, reading.x, reading.y, reading.z
            );
        }
    }
    driver.disable(&mut store).expect("calibration stored");
    reader.join().expect("reader thread");

    println!("calibration stored in {}", path.display());
}
