use std::{env, thread, time::Duration};

use qje_qj3005p::Qj3005p;

fn main() {
    env_logger::init();

    let port = env::args().nth(1).unwrap_or("/dev/ttyUSB0".to_string());
    let mut psu = Qj3005p::serial(&port, Duration::from_millis(500));
    psu.open().expect("Serial port must be available.");

    // Every clone is a handle to the same session. Each exchange holds the session lock, so the
    // threads can not get each other's replies.
    let mut reader = psu.clone();
    let readout = thread::spawn(move || {
        for _ in 0..10 {
            match reader.read() {
                Ok(reading) => println!("{reading}"),
                Err(err) => eprintln!("Reading failed: {err}"),
            }
            thread::sleep(Duration::from_millis(200));
        }
    });

    let mut watcher = psu.clone();
    let status = thread::spawn(move || {
        for _ in 0..10 {
            match watcher.status() {
                Ok(status) => println!("Mode: {}, output: {}", status.mode, status.output),
                Err(err) => eprintln!("Status failed: {err}"),
            }
            thread::sleep(Duration::from_millis(300));
        }
    });

    readout.join().unwrap();
    status.join().unwrap();
    psu.close();
}
