use anyhow::{Result, bail};
use secuvault::MasterSecret;
use std::io::{self, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "SECUVAULT_PASSWORD";

/// Reads the master password.
///
/// Tried in order: the `SECUVAULT_PASSWORD` variable, one line from a
/// piped stdin, an interactive prompt.
pub fn read_master_secret() -> Result<MasterSecret> {
    //  SECUVAULT_PASSWORD="supersecret" secuvault get <id>
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(MasterSecret::new(pw));
        }
    }

    //  echo "supersecret" | secuvault list
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(MasterSecret::from(buf));
        }
    } else {
        let pw = Zeroizing::new(rpassword::prompt_password("Master password: ")?);
        if !pw.is_empty() {
            return Ok(MasterSecret::from(pw));
        }
    }

    bail!("no master password provided")
}

/// Prompts for a one-time code when none was given on the command line.
pub fn read_code(given: Option<String>) -> Result<String> {
    if let Some(code) = given {
        return Ok(code);
    }
    if !io::stdin().is_terminal() {
        bail!("two-factor code required; pass --code");
    }
    let code = rpassword::prompt_password("Two-factor code: ")?;
    Ok(code.trim().to_string())
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
