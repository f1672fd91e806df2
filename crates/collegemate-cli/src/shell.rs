//! Interactive portal shell
//!
//! One shell session is one portal tab: the pending attempt and its code live
//! as long as the shell does. Input is read asynchronously so the mock
//! mailbox can print codes while the prompt is waiting.

use std::io::Write;

use anyhow::{bail, Result};
use collegemate_core::{
    auth::{AuthState, CredentialStore},
    Account, AuthError, Authenticator, PollOption, PollResults, Route, UploadDraft,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::portal::Portal;

/// Message to print, or the error to show the user
type Outcome = std::result::Result<String, String>;

const HELP: &str = "\
Commands:
  signup                 create an account (asks for details, then mails a code)
  login                  sign in (asks for email and password, then mails a code)
  verify <code>          enter the 6-digit code
  resend                 mail a fresh code
  cancel                 abandon the pending login/signup
  logout                 end the session
  whoami                 show the signed-in user
  open <path>            go to a page, e.g. open /events
  poll                   show today's bunk poll
  vote <yes|no|maybe>    vote in today's poll
  upload                 add study material (signed-in only)
  uploads [semester]     list uploaded material
  download <item>        download notes (signed-in only)
  register <event>       register for an event (signed-in only)
  accounts               list registered accounts
  help                   show this help
  quit                   leave the shell";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Signup,
    Login,
    Verify(String),
    Resend,
    Cancel,
    Logout,
    Whoami,
    Open(String),
    Poll,
    Vote(String),
    Upload,
    Uploads(Option<String>),
    Download(String),
    Register(String),
    Accounts,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = || (!rest.is_empty()).then(|| rest.to_string());

    match word.to_ascii_lowercase().as_str() {
        "" => Command::Empty,
        "signup" => Command::Signup,
        "login" => Command::Login,
        "verify" => Command::Verify(rest.to_string()),
        "resend" => Command::Resend,
        "cancel" => Command::Cancel,
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "open" | "go" => Command::Open(rest.to_string()),
        "poll" => Command::Poll,
        "vote" => Command::Vote(rest.to_string()),
        "upload" => Command::Upload,
        "uploads" => Command::Uploads(arg()),
        "download" => Command::Download(rest.to_string()),
        "register" => Command::Register(rest.to_string()),
        "accounts" => Command::Accounts,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

/// Render poll results the way the home page card shows them
pub fn render_poll(results: &PollResults, has_voted: bool) -> String {
    let mut out = String::from("Class Bunk Planner - Today's Breakdown\n");
    for option in PollOption::ALL {
        let marker = if results.leading == Some(option) { "*" } else { " " };
        out.push_str(&format!(
            "{} {:<10} {:>3}%  ({})\n",
            marker,
            option.label(),
            results.percentage(option),
            results.vote_counts.get(option)
        ));
    }

    let plural = if results.total == 1 { "" } else { "s" };
    match results.leading {
        Some(leader) => out.push_str(&format!(
            "{} student{} voted - most students are {}",
            results.total, plural, leader
        )),
        None => out.push_str(&format!(
            "{} student{} voted - be the first to vote!",
            results.total, plural
        )),
    }
    if has_voted {
        out.push_str("\nYour vote has been recorded. Come back tomorrow to vote again.");
    }
    out
}

pub struct Shell<R, W> {
    portal: Portal,
    lines: Lines<BufReader<R>>,
    out: W,
}

impl<R, W> Shell<R, W>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    pub fn new(portal: Portal, input: R, out: W) -> Self {
        Self {
            portal,
            lines: BufReader::new(input).lines(),
            out,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        writeln!(self.out, "College Mate - type 'help' for commands")?;

        loop {
            write!(self.out, "{}> ", self.portal.route())?;
            self.out.flush()?;

            let Some(line) = self.lines.next_line().await? else {
                writeln!(self.out)?;
                return Ok(());
            };

            match parse_command(&line) {
                Command::Quit => return Ok(()),
                command => self.execute(command).await?,
            }
            self.portal.settle();
        }
    }

    async fn ask(&mut self, label: &str) -> Result<String> {
        write!(self.out, "  {}: ", label)?;
        self.out.flush()?;
        match self.lines.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => bail!("input closed"),
        }
    }

    fn report(&mut self, outcome: Outcome) -> Result<()> {
        match outcome {
            Ok(message) => writeln!(self.out, "{}", message)?,
            Err(message) => writeln!(self.out, "✗ {}", message)?,
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        let outcome = match command {
            Command::Empty => return Ok(()),
            Command::Help => Ok(HELP.to_string()),
            Command::Unknown(word) => Err(format!("Unknown command '{}' - try 'help'", word)),
            Command::Signup => self.signup().await?,
            Command::Login => self.login().await?,
            Command::Verify(code) => self.verify(&code),
            Command::Resend => self
                .portal
                .auth
                .resend_code()
                .map(|_| "A new code is on its way.".to_string())
                .map_err(|e| e.to_string()),
            Command::Cancel => {
                self.portal.auth.cancel_pending();
                self.portal.open(Route::Login);
                Ok("Cancelled.".to_string())
            }
            Command::Logout => self
                .portal
                .auth
                .log_out()
                .map(|_| "Signed out.".to_string())
                .map_err(|e| e.to_string()),
            Command::Whoami => self.whoami(),
            Command::Open(path) => {
                let shown = self.portal.open(Route::from_path(&path));
                Ok(format!("Showing {}", shown))
            }
            Command::Poll => self.show_poll(),
            Command::Vote(option) => match self.portal.poll.cast_vote(&option) {
                Ok(results) => Ok(format!(
                    "Vote recorded! Thanks for participating.\n{}",
                    render_poll(&results, true)
                )),
                Err(e) => Err(e.to_string()),
            },
            Command::Upload => self.upload().await?,
            Command::Uploads(semester) => self.list_uploads(semester.as_deref()),
            Command::Download(item) => self.guarded(format!("Downloading notes for {}...", item)),
            Command::Register(event) => {
                self.guarded(format!("Successfully registered for {}!", event))
            }
            Command::Accounts => self.list_accounts(),
            Command::Quit => return Ok(()),
        };
        self.report(outcome)
    }

    fn guarded(&mut self, message: String) -> Outcome {
        if self.portal.auth.require_authentication() {
            Ok(message)
        } else {
            Err("Please log in first.".to_string())
        }
    }

    async fn signup(&mut self) -> Result<Outcome> {
        self.portal.open(Route::Signup);
        let account = Account::new(
            self.ask("Full name").await?,
            self.ask("Email").await?,
            self.ask("Password").await?,
        )
        .with_college(self.ask("College").await?)
        .with_branch(self.ask("Branch").await?)
        .with_year(self.ask("Year").await?)
        .with_roll_number(self.ask("Roll number").await?);

        Ok(self.send_code(|auth| auth.initiate_signup(account)))
    }

    async fn login(&mut self) -> Result<Outcome> {
        self.portal.open(Route::Login);
        let email = self.ask("Email").await?;
        let password = self.ask("Password").await?;

        Ok(self.send_code(|auth| auth.initiate_login(&email, &password)))
    }

    fn send_code<F>(&mut self, start: F) -> Outcome
    where
        F: FnOnce(&mut Authenticator) -> std::result::Result<(), AuthError>,
    {
        match start(&mut self.portal.auth) {
            Ok(()) => {
                self.portal.open(Route::Otp);
                let email = self.portal.auth.pending_email().unwrap_or_default().to_string();
                Ok(format!(
                    "We've sent a verification code to {}. Enter it with 'verify <code>'.",
                    email
                ))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn verify(&mut self, code: &str) -> Outcome {
        let code = code.trim();
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err("Please enter complete 6-digit code".to_string());
        }

        match self.portal.auth.complete_verification(code) {
            Ok(session) => {
                self.portal.open(Route::Home);
                Ok(format!("Verification successful! Welcome, {}.", session.name()))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn whoami(&mut self) -> Outcome {
        let state = self.portal.auth.state();
        match self.portal.auth.current_user() {
            Ok(Some(session)) => {
                let account = &session.account;
                Ok(format!(
                    "{} <{}>\n  {} / {} / year {} / roll {}",
                    account.name,
                    account.email,
                    account.college,
                    account.branch,
                    account.year,
                    account.roll_number
                ))
            }
            Ok(None) => Ok(match (state, self.portal.auth.pending_email()) {
                (AuthState::PendingLogin, Some(email)) => {
                    format!("Not signed in (login code pending for {})", email)
                }
                (AuthState::PendingSignup, Some(email)) => {
                    format!("Not signed in (signup code pending for {})", email)
                }
                _ => "Not signed in".to_string(),
            }),
            Err(e) => Err(e.to_string()),
        }
    }

    fn show_poll(&mut self) -> Outcome {
        let results = self.portal.poll.results().map_err(|e| e.to_string())?;
        let voted = self.portal.poll.has_voted_today().map_err(|e| e.to_string())?;
        Ok(render_poll(&results, voted))
    }

    async fn upload(&mut self) -> Result<Outcome> {
        if !self.portal.auth.require_authentication() {
            return Ok(Err("Please log in first.".to_string()));
        }
        self.portal.open(Route::Upload);

        let draft = UploadDraft {
            semester: self.ask("Semester").await?,
            subject: self.ask("Subject").await?,
            name: self.ask("Title").await?,
            file: self.ask("File").await?,
        };

        Ok(match self.portal.uploads.add(draft) {
            Ok(upload) => {
                self.portal.open(Route::Study);
                Ok(format!("Upload successful! Added to {}", upload.semester))
            }
            Err(e) => Err(e.to_string()),
        })
    }

    fn list_uploads(&mut self, semester: Option<&str>) -> Outcome {
        let uploads = match semester {
            Some(semester) => self.portal.uploads.for_semester(semester),
            None => self.portal.uploads.list(),
        }
        .map_err(|e| e.to_string())?;

        if uploads.is_empty() {
            return Ok("No uploads yet.".to_string());
        }
        Ok(uploads
            .iter()
            .map(|u| format!("[{}] {} - {} ({})", u.semester, u.subject, u.name, u.file))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn list_accounts(&mut self) -> Outcome {
        let accounts = self
            .portal
            .auth
            .credentials()
            .list_accounts()
            .map_err(|e| e.to_string())?;
        if accounts.is_empty() {
            return Ok("No accounts registered.".to_string());
        }
        Ok(accounts
            .iter()
            .map(|a| format!("{} <{}>", a.name, a.email))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
