//! Best-effort navigation to the login entry point.

use color_eyre::Result;
use tracing::debug;

/// Path of the login entry point.
pub const LOGIN_PATH: &str = "/login";

/// A surface that can send the user to the login entry point.
pub trait Navigator: Send + Sync {
  fn go_to_login(&self) -> Result<()>;
}

/// Redirect to login if a navigation surface is available.
///
/// Absence of a navigator and failures raised by it are swallowed.
pub fn redirect_to_login(navigator: Option<&dyn Navigator>) {
  let Some(navigator) = navigator else {
    return;
  };

  debug!(path = LOGIN_PATH, "redirecting to login");
  if let Err(e) = navigator.go_to_login() {
    debug!(error = %e, "login redirect failed");
  }
}

/// Navigator for terminal sessions: tells the user how to sign in again.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoginHint;

impl Navigator for LoginHint {
  fn go_to_login(&self) -> Result<()> {
    eprintln!("Session expired. Sign in again with `clinic login --token <TOKEN>`.");
    Ok(())
  }
}
