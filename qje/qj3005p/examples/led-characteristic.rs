//! Record the forward voltage of a LED between 1 mA and 20 mA.
//!
//! Connect the LED directly to the PSU, minding the polarity. The voltage is limited to 4 V, so
//! the PSU stays in constant current mode during the whole sweep. The result is printed as CSV.

use std::{env, thread, time::Duration};

use measurements::{Current, Voltage};

use qje_qj3005p::{PsuError, Qj3005p, RegulationMode, SETTLE_TIME_HINT};

fn main() -> Result<(), PsuError> {
    env_logger::init();

    let port = env::args().nth(1).unwrap_or("/dev/ttyUSB0".to_string());
    let mut psu = Qj3005p::serial(&port, Duration::from_millis(500));

    let results = psu.with_open(|psu| {
        psu.disable()?;
        psu.set(Voltage::from_volts(4.0), Current::from_amperes(0.001))?;
        psu.enable_settled(SETTLE_TIME_HINT)?;

        let mut results = Vec::new();
        for milliamps in 1..=20 {
            psu.set_current(Current::from_amperes(f64::from(milliamps) / 1000.0))?;
            thread::sleep(Duration::from_secs(1));
            let reading = psu.read()?;
            if reading.mode != RegulationMode::ConstantCurrent {
                log::warn!("PSU left constant current mode at {milliamps} mA. Is the LED connected?");
            }
            results.push(reading);
        }

        psu.disable()?;
        Ok(results)
    })?;

    println!("forward current [mA],forward voltage [V],power [mW]");
    for reading in results {
        let milliamps = reading.current.as_milliamperes();
        let volts = reading.voltage.as_volts();
        println!("{milliamps:3.0},{volts:5.2},{:4.0}", milliamps * volts);
    }
    Ok(())
}
