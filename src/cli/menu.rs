//! Interactive menu: a thin loop over [`dispatch`].

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};

use super::{install, test};

const WELCOME: &str = "Welcome to LEMPXpert - Your LEMP Server Manager";
const OPTIONS: &str = "Select an option:\n1. Install LEMPXpert\n2. Test Server\n3. Exit";
const PROMPT: &str = "Enter your choice (1/2/3): ";
const INVALID: &str = "Invalid choice. Please select a valid option (1/2/3).";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MenuChoice {
    Install,
    Test,
    Exit,
}

impl FromStr for MenuChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(MenuChoice::Install),
            "2" => Ok(MenuChoice::Test),
            "3" => Ok(MenuChoice::Exit),
            other => Err(format!("unknown menu choice '{}'", other)),
        }
    }
}

/// What the loop does after a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    RunInstall,
    RunTest,
    Exit,
}

/// Message to print and the follow-up for `choice`. No side effects.
pub(crate) fn dispatch(choice: MenuChoice) -> (&'static str, Next) {
    match choice {
        MenuChoice::Install => ("Installing LEMPXpert...", Next::RunInstall),
        MenuChoice::Test => ("Testing Server...", Next::RunTest),
        MenuChoice::Exit => ("Exiting LEMPXpert. Goodbye!", Next::Exit),
    }
}

/// Read choices from `input` until Exit or EOF, handing actions to `run`.
pub(crate) async fn menu_loop<R, W, F, Fut>(mut input: R, out: &mut W, mut run: F) -> Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(Next) -> Fut,
    Fut: Future<Output = ()>,
{
    writeln!(out, "{}", WELCOME)?;
    loop {
        writeln!(out, "{}", OPTIONS)?;
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).context("Failed to read input")? == 0 {
            writeln!(out)?;
            return Ok(());
        }

        let choice = match line.parse::<MenuChoice>() {
            Ok(choice) => choice,
            Err(_) => {
                writeln!(out, "{}", INVALID)?;
                continue;
            }
        };

        let (message, next) = dispatch(choice);
        writeln!(out, "{}", message)?;
        if next == Next::Exit {
            return Ok(());
        }
        out.flush()?;
        run(next).await;
    }
}

pub(crate) async fn cmd_menu() -> Result<ExitCode> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    menu_loop(stdin.lock(), &mut stdout, |next| async move {
        let result = match next {
            Next::RunInstall => install::cmd_install(Vec::new()).await,
            Next::RunTest => test::cmd_test(false, Vec::new()).await,
            Next::Exit => return,
        };
        if let Err(e) = result {
            eprintln!("Error: {:#}", e);
        }
    })
    .await?;
    Ok(ExitCode::SUCCESS)
}
