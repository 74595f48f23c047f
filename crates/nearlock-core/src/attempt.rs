//! A single unlock or sign-in attempt.
//!
//! An attempt starts when the user clicks the pod, waits for the companion
//! app to answer, and finalizes exactly once: unlocked, sign-in requested, or
//! cancelled. Abandoned attempts must be cancelled so the lock screen
//! re-enables password input.

use chacha20poly1305::{
    KeyInit, XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, OsRng},
};
use tracing::debug;

use crate::{
    action::ServiceAction, error::AttemptError, screenlock::LockScreenCommand, types::UserId,
};

/// XChaCha20 nonce length prefixed to wrapped secrets.
const NONCE_LEN: usize = 24;

/// Which screen the attempt authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// Lock screen of a signed-in session.
    Unlock,
    /// Login screen.
    Signin,
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The screen was unlocked.
    Unlocked,
    /// Sign-in was requested with the unwrapped secret.
    SigninRequested,
    /// The attempt was abandoned.
    Cancelled,
}

/// Attempt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Created, not yet started.
    Started,
    /// The companion app was asked to authenticate.
    WaitingForRemote,
    /// Finished.
    Finalized(AttemptOutcome),
}

/// Preconditions checked when an attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// The screen is locked.
    pub screen_locked: bool,
    /// The pod offers click-to-unlock.
    pub click_to_unlock: bool,
    /// The companion app is loaded.
    pub app_loaded: bool,
}

/// One authentication attempt
#[derive(Debug)]
pub struct AuthAttempt {
    kind: AttemptKind,
    user: UserId,
    state: AttemptState,
}

impl AuthAttempt {
    /// Create an attempt for `user`.
    pub fn new(kind: AttemptKind, user: UserId) -> Self {
        Self { kind, user, state: AttemptState::Started }
    }

    /// Attempt kind.
    pub fn kind(&self) -> AttemptKind {
        self.kind
    }

    /// User being authenticated.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Ask the companion app to authenticate the user.
    pub fn start(&mut self, ctx: AttemptContext) -> Result<Vec<ServiceAction>, AttemptError> {
        if self.state != AttemptState::Started {
            return Err(AttemptError::InvalidState { state: self.state });
        }
        if !ctx.screen_locked {
            return Err(AttemptError::ScreenNotLocked);
        }
        if !ctx.click_to_unlock {
            return Err(AttemptError::NotClickToUnlock);
        }
        if !ctx.app_loaded {
            return Err(AttemptError::AppNotLoaded);
        }

        self.state = AttemptState::WaitingForRemote;
        Ok(vec![ServiceAction::NotifyAuthAttempt { user: self.user.clone() }])
    }

    /// Finish an unlock attempt. Failure, or an attempt of the wrong kind,
    /// cancels it.
    pub fn finalize_unlock(&mut self, user: &UserId, success: bool) -> Vec<ServiceAction> {
        if !self.accepts_finalize(user) {
            return Vec::new();
        }
        if self.kind != AttemptKind::Unlock || !success {
            return self.cancel();
        }

        self.state = AttemptState::Finalized(AttemptOutcome::Unlocked);
        vec![ServiceAction::LockScreen(LockScreenCommand::Unlock { user: self.user.clone() })]
    }

    /// Finish a sign-in attempt by unwrapping the stored secret with `key`.
    pub fn finalize_signin(
        &mut self,
        user: &UserId,
        wrapped_secret: &[u8],
        key: &[u8],
    ) -> Vec<ServiceAction> {
        if !self.accepts_finalize(user) {
            return Vec::new();
        }
        if self.kind != AttemptKind::Signin || wrapped_secret.is_empty() {
            return self.cancel();
        }
        let Some(secret) = unwrap_secret(wrapped_secret, key) else {
            debug!(user = %self.user, "failed to unwrap sign-in secret");
            return self.cancel();
        };

        self.state = AttemptState::Finalized(AttemptOutcome::SigninRequested);
        vec![ServiceAction::LockScreen(LockScreenCommand::AttemptSignin {
            user: self.user.clone(),
            wrapped_secret: wrapped_secret.to_vec(),
            secret,
        })]
    }

    /// Abandon the attempt and re-enable password input.
    pub fn cancel(&mut self) -> Vec<ServiceAction> {
        match self.state {
            AttemptState::Finalized(_) => Vec::new(),
            AttemptState::Started => {
                self.state = AttemptState::Finalized(AttemptOutcome::Cancelled);
                Vec::new()
            },
            AttemptState::WaitingForRemote => {
                self.state = AttemptState::Finalized(AttemptOutcome::Cancelled);
                vec![ServiceAction::LockScreen(LockScreenCommand::EnableInput)]
            },
        }
    }

    /// Drop the attempt, cancelling it if still unfinished.
    pub fn discard(mut self) -> Vec<ServiceAction> {
        self.cancel()
    }

    fn accepts_finalize(&self, user: &UserId) -> bool {
        if self.state != AttemptState::WaitingForRemote {
            debug!(state = ?self.state, "finalize outside of a running attempt");
            return false;
        }
        if *user != self.user {
            debug!(expected = %self.user, got = %user, "finalize for another user");
            return false;
        }
        true
    }
}

/// Unseal a secret wrapped by [`wrap_secret`]. Returns `None` for an empty
/// or wrong key, or a malformed blob.
pub fn unwrap_secret(wrapped: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    if key.is_empty() || wrapped.len() < NONCE_LEN {
        return None;
    }
    let cipher = XChaCha20Poly1305::new_from_slice(key).ok()?;
    let (nonce, ciphertext) = wrapped.split_at(NONCE_LEN);
    cipher.decrypt(XNonce::from_slice(nonce), ciphertext).ok()
}

/// Seal `secret` under a 32-byte `key` with a fresh random nonce.
pub fn wrap_secret(secret: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).ok()?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, secret).ok()?;

    let mut wrapped = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    wrapped.extend_from_slice(&nonce);
    wrapped.extend_from_slice(&ciphertext);
    Some(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7; 32];

    fn alice() -> UserId {
        UserId::new("alice@example.com")
    }

    fn ready() -> AttemptContext {
        AttemptContext { screen_locked: true, click_to_unlock: true, app_loaded: true }
    }

    fn started(kind: AttemptKind) -> AuthAttempt {
        let mut attempt = AuthAttempt::new(kind, alice());
        attempt.start(ready()).unwrap();
        attempt
    }

    #[test]
    fn start_checks_preconditions() {
        let mut attempt = AuthAttempt::new(AttemptKind::Unlock, alice());
        let ctx = AttemptContext { app_loaded: false, ..ready() };
        assert_eq!(attempt.start(ctx), Err(AttemptError::AppNotLoaded));

        let ctx = AttemptContext { click_to_unlock: false, ..ready() };
        assert_eq!(attempt.start(ctx), Err(AttemptError::NotClickToUnlock));

        let ctx = AttemptContext { screen_locked: false, ..ready() };
        assert_eq!(attempt.start(ctx), Err(AttemptError::ScreenNotLocked));

        let actions = attempt.start(ready()).unwrap();
        assert_eq!(actions, vec![ServiceAction::NotifyAuthAttempt { user: alice() }]);
        assert_eq!(attempt.state(), AttemptState::WaitingForRemote);

        assert!(matches!(attempt.start(ready()), Err(AttemptError::InvalidState { .. })));
    }

    #[test]
    fn unlock_success() {
        let mut attempt = started(AttemptKind::Unlock);
        let actions = attempt.finalize_unlock(&alice(), true);

        assert_eq!(
            actions,
            vec![ServiceAction::LockScreen(LockScreenCommand::Unlock { user: alice() })]
        );
        assert_eq!(attempt.state(), AttemptState::Finalized(AttemptOutcome::Unlocked));
        assert!(attempt.finalize_unlock(&alice(), true).is_empty());
    }

    #[test]
    fn unlock_failure_cancels() {
        let mut attempt = started(AttemptKind::Unlock);
        let actions = attempt.finalize_unlock(&alice(), false);

        assert_eq!(actions, vec![ServiceAction::LockScreen(LockScreenCommand::EnableInput)]);
        assert_eq!(attempt.state(), AttemptState::Finalized(AttemptOutcome::Cancelled));
    }

    #[test]
    fn finalize_for_other_user_ignored() {
        let mut attempt = started(AttemptKind::Unlock);
        assert!(attempt.finalize_unlock(&UserId::new("bob@example.com"), true).is_empty());
        assert_eq!(attempt.state(), AttemptState::WaitingForRemote);
    }

    #[test]
    fn signin_unwraps_secret() {
        let wrapped = wrap_secret(b"hunter2", &KEY).unwrap();
        let mut attempt = started(AttemptKind::Signin);
        let actions = attempt.finalize_signin(&alice(), &wrapped, &KEY);

        assert_eq!(
            actions,
            vec![ServiceAction::LockScreen(LockScreenCommand::AttemptSignin {
                user: alice(),
                wrapped_secret: wrapped,
                secret: b"hunter2".to_vec(),
            })]
        );
    }

    #[test]
    fn signin_with_empty_or_wrong_key_cancels() {
        let wrapped = wrap_secret(b"hunter2", &KEY).unwrap();

        let mut attempt = started(AttemptKind::Signin);
        attempt.finalize_signin(&alice(), &wrapped, &[]);
        assert_eq!(attempt.state(), AttemptState::Finalized(AttemptOutcome::Cancelled));

        let mut attempt = started(AttemptKind::Signin);
        attempt.finalize_signin(&alice(), &wrapped, &[9; 32]);
        assert_eq!(attempt.state(), AttemptState::Finalized(AttemptOutcome::Cancelled));
    }

    #[test]
    fn signin_on_unlock_attempt_cancels() {
        let wrapped = wrap_secret(b"hunter2", &KEY).unwrap();
        let mut attempt = started(AttemptKind::Unlock);
        attempt.finalize_signin(&alice(), &wrapped, &KEY);
        assert_eq!(attempt.state(), AttemptState::Finalized(AttemptOutcome::Cancelled));
    }

    #[test]
    fn discard_reenables_input_only_while_waiting() {
        let attempt = started(AttemptKind::Unlock);
        assert_eq!(attempt.discard(), vec![ServiceAction::LockScreen(LockScreenCommand::EnableInput)]);

        let attempt = AuthAttempt::new(AttemptKind::Unlock, alice());
        assert!(attempt.discard().is_empty());
    }

    #[test]
    fn malformed_wrapped_secret() {
        assert_eq!(unwrap_secret(&[1, 2, 3], &KEY), None);
        assert_eq!(wrap_secret(b"x", &[1; 5]), None);
    }
}
