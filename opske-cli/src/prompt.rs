use std::io::{self, BufRead, Write};

use opske::{CredentialSource, Credentials};

/// Asks for the portal login on the terminal. An empty answer cancels.
pub struct TerminalPrompt;

fn ask_username() -> Option<String> {
    print!("Username: ");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    non_empty(line.trim().to_string())
}

/// Read without echo; the password is kept exactly as typed.
fn ask_password() -> Option<String> {
    let password = rpassword::prompt_password("Password: ").ok()?;
    non_empty(password)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl CredentialSource for TerminalPrompt {
    fn credentials(&mut self) -> Option<Credentials> {
        println!("Portal login (leave empty to cancel)");
        let username = ask_username()?;
        let password = ask_password()?;
        Some(Credentials::new(username, password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_answers_cancel_and_others_are_kept_verbatim() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty(" pa ss ".to_string()).as_deref(), Some(" pa ss "));
    }
}
