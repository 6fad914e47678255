use std::process::ExitCode;

use clap::Parser;

use blectl::{Args, run_with_log_level};

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let exit_code = if error.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
            let _ = error.print();
            return exit_code;
        }
    };
    let mut stdout = std::io::stdout();

    let log_level = args.log_level();
    let completion_timeout = args.wait();
    let run_result = args
        .into_command_and_config()
        .and_then(|(command, config)| {
            run_with_log_level(command, &mut stdout, config, completion_timeout, log_level)
        });

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
