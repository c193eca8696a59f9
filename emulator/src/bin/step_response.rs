//! Records a closed-loop speed step as CSV.
//!
//! The mode switch is moved to Auto, the reference is applied once the
//! scheduler has entered Auto, and every tick after that is written out.

use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;
#[allow(dead_code)]
#[path = "../vehicle.rs"]
mod vehicle;

use drive_core::config::{CTRL_MODEL_A, LOOP_PERIOD_MS};
use drive_core::mode::Mode;
use session::Session;

const DEFAULT_REFERENCE: f32 = 40.0;
const RECORD_TICKS: u32 = 2_500;
const SWITCH_TIMEOUT_TICKS: u32 = 500;

fn main() -> io::Result<()> {
    let mut args = env::args().skip(1);
    let output = args.next();
    let reference = match args.next() {
        Some(value) => value.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid reference `{value}`"),
            )
        })?,
        None => DEFAULT_REFERENCE,
    };

    let writer: Box<dyn Write> = match output.as_deref() {
        None | Some("-") => Box::new(io::stdout().lock()),
        Some(path) => Box::new(File::create(path)?),
    };
    record(BufWriter::new(writer), reference)
}

fn record(mut out: impl Write, reference: f32) -> io::Result<()> {
    let mut session = Session::new(CTRL_MODEL_A, None)?;
    session.set_mode_switch(Mode::Auto);

    let mut switched = false;
    for _ in 0..SWITCH_TIMEOUT_TICKS {
        if session.step().mode == Mode::Auto {
            switched = true;
            break;
        }
    }
    if !switched {
        return Err(io::Error::other("scheduler never entered auto mode"));
    }

    session.set_speed(reference);
    writeln!(
        out,
        "t_ms,reference,plant_omega,omega_left,omega_right,effort,esc_duty"
    )?;
    for tick in 0..RECORD_TICKS {
        let report = session.step();
        writeln!(
            out,
            "{},{reference},{:.4},{:.4},{:.4},{},{}",
            tick * LOOP_PERIOD_MS,
            session.plant_omega(),
            report.omega_left,
            report.omega_right,
            report.effort.map_or(String::new(), |effort| format!("{effort:.5}")),
            report.esc_duty
        )?;
    }
    out.flush()
}
