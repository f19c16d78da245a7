//! AUTHINFO USER/PASS (RFC 4643)

use super::{ConnectionState, NntpClient};
use crate::commands;
use crate::error::{NntpError, Result};
use crate::response::{NntpResponse, codes};
use tracing::debug;

fn auth_error(reply: NntpResponse) -> NntpError {
    let text = format!("{} {}", reply.code, reply.message);
    match reply.code {
        codes::AUTH_REJECTED | codes::AUTH_OUT_OF_SEQUENCE => NntpError::AuthRejected(text),
        500..=503 => NntpError::AuthUnsupported(text),
        code => NntpError::Protocol {
            code,
            message: reply.message,
        },
    }
}

impl NntpClient {
    /// Log in; a 281 straight after USER skips the password
    ///
    /// # Errors
    ///
    /// [`NntpError::AuthRejected`] for 481/482, [`NntpError::AuthUnsupported`]
    /// when the server has no AUTHINFO (500-503), and [`NntpError::Protocol`]
    /// for anything else, including a second call on the same session.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        if self.state == ConnectionState::Authenticated {
            return Err(NntpError::Protocol {
                code: codes::ACCESS_DENIED,
                message: "session is already logged in".to_string(),
            });
        }

        self.send_command(&commands::authinfo_user(username)).await?;
        self.state = ConnectionState::InProgress;
        let mut reply = self.read_response().await?;
        if reply.code == codes::AUTH_CONTINUE {
            self.send_command(&commands::authinfo_pass(password)).await?;
            reply = self.read_response().await?;
        }

        if reply.code != codes::AUTH_ACCEPTED {
            self.state = ConnectionState::Ready;
            return Err(auth_error(reply));
        }
        self.state = ConnectionState::Authenticated;
        debug!(provider = %self.provider.label(), "Logged in as {}", username);
        Ok(())
    }
}
