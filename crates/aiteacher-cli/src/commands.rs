//! Command-line parsing.

use std::fmt;

/// Top-level usage text
pub const USAGE: &str = "\
Usage: aiteacher <command> [args]

Commands:
  status                              Restore the saved session and show its state
  login [email]                       Log in (prompts for anything missing)
  register <email> <name>             Create an account
  logout [--forget]                   Log out; --forget also drops the remembered password
  whoami                              Show the logged-in user
  children                            List child profiles
  add-child <name> <grade> <subject>... [--style <learning style>]
                                      Create a child profile
  open <path>                         Show what navigating to a page would do
  forgot-password <email>             Request a password reset
  verify-email <token>                Verify an email address
  help                                Show this message
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Login { email: Option<String> },
    Register { email: String, name: String },
    Logout { forget: bool },
    WhoAmI,
    Children,
    AddChild {
        name: String,
        grade: String,
        subjects: Vec<String>,
        learning_style: Option<String>,
    },
    Open { path: String },
    ForgotPassword { email: String },
    VerifyEmail { token: String },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.0, USAGE)
    }
}

impl std::error::Error for UsageError {}

impl Command {
    /// Parse the arguments after the program name
    pub fn parse(args: &[String]) -> Result<Command, UsageError> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Status);
        };

        match name.as_str() {
            "status" => Ok(Command::Status),
            "login" => Ok(Command::Login {
                email: rest.first().cloned(),
            }),
            "register" => match rest {
                [email, name, ..] => Ok(Command::Register {
                    email: email.clone(),
                    name: name.clone(),
                }),
                _ => Err(UsageError("register needs <email> <name>".to_string())),
            },
            "logout" => Ok(Command::Logout {
                forget: rest.iter().any(|a| a == "--forget"),
            }),
            "whoami" => Ok(Command::WhoAmI),
            "children" => Ok(Command::Children),
            "add-child" => Self::parse_add_child(rest),
            "open" => match rest.first() {
                Some(path) => Ok(Command::Open { path: path.clone() }),
                None => Err(UsageError("open needs <path>".to_string())),
            },
            "forgot-password" => match rest.first() {
                Some(email) => Ok(Command::ForgotPassword {
                    email: email.clone(),
                }),
                None => Err(UsageError("forgot-password needs <email>".to_string())),
            },
            "verify-email" => match rest.first() {
                Some(token) => Ok(Command::VerifyEmail {
                    token: token.clone(),
                }),
                None => Err(UsageError("verify-email needs <token>".to_string())),
            },
            "help" | "--help" | "-h" => Ok(Command::Help),
            other => Err(UsageError(format!("Unknown command: {}", other))),
        }
    }

    fn parse_add_child(rest: &[String]) -> Result<Command, UsageError> {
        let mut positional = Vec::new();
        let mut learning_style = None;
        let mut iter = rest.iter();
        while let Some(arg) = iter.next() {
            if arg == "--style" {
                let style = iter
                    .next()
                    .ok_or_else(|| UsageError("--style needs a value".to_string()))?;
                learning_style = Some(style.clone());
            } else {
                positional.push(arg.clone());
            }
        }

        if positional.len() < 2 {
            return Err(UsageError(
                "add-child needs <name> <grade> <subject>...".to_string(),
            ));
        }
        let subjects = positional.split_off(2);
        let grade = positional.pop().unwrap_or_default();
        let name = positional.pop().unwrap_or_default();
        Ok(Command::AddChild {
            name,
            grade,
            subjects,
            learning_style,
        })
    }
}
