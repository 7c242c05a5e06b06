use compass_calibration::{CalibrationEngine, EngineSettings};

const SAMPLE_PERIOD_MS: i64 = 50; // 20 Hz
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Stand-in for a magnetometer being waved around: a 45 µT field seen
/// through a hard-iron offset and uneven axis gains
fn read_magnetometer(i: usize) -> (f64, f64, f64) {
    let z = 1.0 - (2.0 * (i % 64) as f64 + 1.0) / 64.0;
    let r = (1.0 - z * z).sqrt();
    let theta = GOLDEN_ANGLE * i as f64;
    (
        12.0 + 45.0 * r * theta.cos() / 1.05,
        -30.0 + 45.0 * r * theta.sin() / 0.96,
        4.0 + 45.0 * z,
    )
}

fn main() {
    let mut engine =
        CalibrationEngine::new(EngineSettings::default()).expect("default settings are valid");
    engine.init(None);

    for i in 0..200 {
        // this loop should repeat each time new magnetometer data is available
        let (x, y, z) = read_magnetometer(i);
        let t_ms = i as i64 * SAMPLE_PERIOD_MS;

        engine.collect(x, y, z, t_ms);
        if engine.ready_check() {
            let transform = engine.compute().expect("calibration in force");
            println!(
                "Calibrated after {} samples: offset [{:.2}, {:.2}, {:.2}], field {:.2} µT",
                i + 1,
                transform.offset.x,
                transform.offset.y,
                transform.offset.z,
                transform.field_strength.unwrap_or(0.0)
            );
            break;
        }
    }
}
