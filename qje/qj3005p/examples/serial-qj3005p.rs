use std::{env, thread, time::Duration};

use measurements::{Current, Voltage};

use qje_qj3005p::{Qj3005p, SETTLE_TIME_HINT};

fn main() {
    // Set `RUST_LOG=debug` to see every line that goes over the wire.
    env_logger::init();

    // Port name as first argument, e.g., `/dev/ttyUSB0` or `COM3`.
    let port = env::args().nth(1).unwrap_or("/dev/ttyUSB0".to_string());

    // Create a closed session for the PSU on the serial port.
    let mut psu = Qj3005p::serial(&port, Duration::from_millis(500));

    // Check if anything answers before taking over the PSU.
    if !psu.probe_available() {
        println!("No PSU answers on {port}. Please check your setup.");
        return;
    }

    psu.open().expect("Serial port must be available.");
    println!("Connected to: {}", psu.identify().unwrap());

    // Set 5 V with a current limit of 100 mA and switch the output on.
    psu.set(Voltage::from_volts(5.0), Current::from_amperes(0.1))
        .unwrap();
    psu.enable().unwrap();
    thread::sleep(SETTLE_TIME_HINT);

    // Print a reading and the set points as the PSU reports them.
    println!("{}", psu.read().unwrap());
    println!(
        "Set points: {:.2} V, {:.3} A",
        psu.get_voltage_setpoint().unwrap().as_volts(),
        psu.get_current_setpoint().unwrap().as_amperes()
    );

    psu.disable().unwrap();
    psu.close();
}
