//! Operator console grammar.
//!
//! One command per line:
//!
//! ```text
//! status
//! mode <auto|secure|manual>
//! speed <rad/s>
//! duty <pwm>
//! steer <pwm>
//! stick <traction_us> <steering_us>
//! run <ticks>
//! help
//! ```

use core::fmt;

use winnow::ascii::{dec_uint, float, space0, space1};
use winnow::combinator::{alt, delimited, preceded, separated_pair};
use winnow::prelude::*;

use crate::mode::Mode;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConsoleCommand {
    Status,
    Mode(Mode),
    /// Wheel speed reference in rad/s.
    Speed(f32),
    /// Raw ESC duty, bypassing the speed controller.
    Duty(u16),
    Steer(u16),
    /// Receiver stick pulse widths in microseconds, used in Manual.
    Stick { traction_us: u32, steering_us: u32 },
    /// Advance the simulation by this many control ticks.
    Run(u32),
    Help,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    /// Parser rejected the submitted line.
    Syntax,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Syntax => f.write_str("unrecognised command, try `help`"),
        }
    }
}

pub const HELP: &str = "\
status                      show mode, wheel speeds and duties
mode <auto|secure|manual>   move the receiver mode switch
speed <rad/s>               speed reference sent over the host link
duty <pwm>                  raw ESC duty sent over the host link
steer <pwm>                 servo duty sent over the host link
stick <traction> <steering> receiver stick pulse widths in us
run <ticks>                 advance the control loop
help                        this text";

/// Parses one console line; surrounding whitespace is ignored.
pub fn parse(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    delimited(space0, command, space0)
        .parse(line.trim_end_matches(['\r', '\n']))
        .map_err(|_| ConsoleError::Syntax)
}

fn command(input: &mut &str) -> winnow::Result<ConsoleCommand> {
    alt((
        preceded(("mode", space1), mode_name).map(ConsoleCommand::Mode),
        preceded(("speed", space1), float).map(ConsoleCommand::Speed),
        preceded(("duty", space1), dec_uint).map(ConsoleCommand::Duty),
        preceded(("steer", space1), dec_uint).map(ConsoleCommand::Steer),
        preceded(
            ("stick", space1),
            separated_pair(dec_uint, space1, dec_uint),
        )
        .map(|(traction_us, steering_us)| ConsoleCommand::Stick {
            traction_us,
            steering_us,
        }),
        preceded(("run", space1), dec_uint).map(ConsoleCommand::Run),
        "status".value(ConsoleCommand::Status),
        "help".value(ConsoleCommand::Help),
    ))
    .parse_next(input)
}

fn mode_name(input: &mut &str) -> winnow::Result<Mode> {
    alt((
        "auto".value(Mode::Auto),
        "secure".value(Mode::Secure),
        "manual".value(Mode::Manual),
    ))
    .parse_next(input)
}
