mod session;
mod vehicle;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use drive_core::config::CTRL_MODEL_A;
use session::Session;

struct Options {
    plant_a: f32,
    transcript: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: drive-emulator [--plant-a <1/s>] [--transcript <path>]");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.plant_a, options.transcript.as_deref())?;
    let mut line = String::new();

    writeln!(
        writer,
        "Drive emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        plant_a: CTRL_MODEL_A,
        transcript: None,
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--plant-a" => {
                let value = args.next().ok_or("Expected value after --plant-a")?;
                options.plant_a = value
                    .parse()
                    .map_err(|_| format!("Invalid plant pole `{value}`"))?;
            }
            "--transcript" => {
                let value = args.next().ok_or("Expected value after --transcript")?;
                options.transcript = Some(PathBuf::from(value));
            }
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }
    Ok(options)
}
