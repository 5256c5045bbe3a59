use chrono::Duration;
use log::{debug, error, info, warn};

use super::error::AuthError;
use super::password::CredentialHasher;
use super::request::RegisterRequest;
use super::store::{
    Datastore, OutboxEntry, OutboxId, StoreError, Transaction, User, VerificationStatus,
    VerificationToken, CLAIM_TIMEOUT_SECS,
};
use super::tokens::generate_verification_token;
use crate::modules::email::{
    activation_email, ActivationSettings, MailError, NotificationEmail, NotificationSender,
};
use crate::modules::utils::logging::{log_auth_event, log_data_operation};

/// Outcome of an outbox dispatch run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Entries another sender was already delivering
    pub skipped: usize,
}

/// Signup and account verification.
///
/// Every collaborator is passed in explicitly. The user and token stores are
/// the two halves of one [`Datastore`] so their writes commit together.
pub struct AccountService<H, D, N> {
    hasher: H,
    datastore: D,
    sender: N,
    settings: ActivationSettings,
}

impl<H, D, N> AccountService<H, D, N>
where
    H: CredentialHasher,
    D: Datastore,
    N: NotificationSender,
{
    pub fn new(hasher: H, datastore: D, sender: N, settings: ActivationSettings) -> Self {
        Self {
            hasher,
            datastore,
            sender,
            settings,
        }
    }

    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    /// Create an unverified account and send its activation email.
    ///
    /// The user, its token and the queued email commit in one transaction.
    /// Delivery is attempted only after that commit; if it fails the email
    /// stays in the outbox and the signup still succeeds.
    pub fn signup(&self, request: &RegisterRequest) -> Result<(), AuthError> {
        let user = User::new(
            &request.username,
            self.hasher.hash(&request.password),
            &request.email,
        );

        let (outbox_id, email) = match self.persist_signup(user) {
            Ok(queued) => queued,
            Err(e) => {
                error!("Error occurred during signup: {}", e);
                log_auth_event("signup", &request.username, false, Some(&e.to_string()));
                return Err(AuthError::registration(e));
            }
        };

        log_auth_event("signup", &request.username, true, None);
        self.deliver(outbox_id, &email);
        Ok(())
    }

    fn persist_signup(&self, user: User) -> Result<(OutboxId, NotificationEmail), StoreError> {
        let mut tx = self.datastore.begin()?;

        let user = tx.save_user(user)?;
        let token = self.issue_verification_token(tx.as_mut(), &user)?;
        let email = activation_email(&self.settings, &user.email, &token);
        let outbox_id = tx.enqueue(email.clone())?;
        // Reserved for the post-commit delivery below
        tx.claim(outbox_id, claim_timeout())?;

        tx.commit()?;
        Ok((outbox_id, email))
    }

    fn issue_verification_token(
        &self,
        tx: &mut dyn Transaction,
        user: &User,
    ) -> Result<String, StoreError> {
        let token = generate_verification_token();
        tx.save_token(VerificationToken::new(token.clone(), user))?;
        Ok(token)
    }

    /// Mark the account owning `token` as verified.
    ///
    /// Verifying an already verified account succeeds. Tokens are neither
    /// consumed nor expired.
    pub fn verify_account(&self, token: &str) -> Result<(), AuthError> {
        let mut tx = self.datastore.begin()?;

        let verification = tx.find_by_token(token)?.ok_or(AuthError::InvalidToken)?;
        let username = verification.username;

        let mut user = match tx.find_by_username(&username)? {
            Some(user) => user,
            None => {
                log_auth_event("verify_account", &username, false, Some("user not found"));
                return Err(AuthError::UserNotFound { username });
            }
        };

        user.verification_status = VerificationStatus::Verified;
        tx.save_user(user)?;
        tx.commit()?;

        log_auth_event("verify_account", &username, true, None);
        Ok(())
    }

    /// Undelivered notifications, oldest first
    pub fn pending_notifications(&self) -> Result<Vec<OutboxEntry>, AuthError> {
        let tx = self.datastore.begin()?;
        Ok(tx.pending()?)
    }

    /// Try to deliver every pending notification.
    ///
    /// No transaction is open while mail is being sent: each entry is
    /// claimed, sent and recorded in separate short transactions. Entries
    /// someone else has claimed are skipped.
    pub fn dispatch_outbox(&self) -> Result<DispatchReport, AuthError> {
        let mut report = DispatchReport::default();

        for entry in self.pending_notifications()? {
            if !self.claim(entry.id)? {
                debug!("Outbox entry {} is claimed elsewhere, skipping", entry.id);
                report.skipped += 1;
                continue;
            }

            let (outcome, recorded) = self.send_claimed(entry.id, &entry.email);
            recorded?;
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Delivery of outbox entry {} failed: {}", entry.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Outbox dispatch finished: delivered={}, failed={}, skipped={}",
            report.delivered, report.failed, report.skipped
        );
        Ok(report)
    }

    fn claim(&self, id: OutboxId) -> Result<bool, StoreError> {
        let mut tx = self.datastore.begin()?;
        let claimed = tx.claim(id, claim_timeout())?;
        if claimed {
            tx.commit()?;
        }
        Ok(claimed)
    }

    /// Send an entry this service has claimed, then record the outcome
    fn send_claimed(
        &self,
        id: OutboxId,
        email: &NotificationEmail,
    ) -> (Result<(), MailError>, Result<(), StoreError>) {
        let outcome = self.sender.send(email);

        let recorded = self.datastore.begin().and_then(|mut tx| {
            match &outcome {
                Ok(()) => tx.mark_delivered(id)?,
                Err(e) => tx.record_failure(id, &e.to_string())?,
            }
            tx.commit()
        });

        (outcome, recorded)
    }

    /// Post-commit delivery of one queued email. Errors end up in the log
    /// and on the outbox entry, never with the caller.
    fn deliver(&self, id: OutboxId, email: &NotificationEmail) {
        let (outcome, recorded) = self.send_claimed(id, email);
        if let Err(e) = &outcome {
            warn!("Activation email could not be sent, left queued: {}", e);
        }

        log_data_operation(
            "deliver_notification",
            &email.recipient,
            "outbox",
            outcome.is_ok() && recorded.is_ok(),
            recorded.err().map(|e| e.to_string()).as_deref(),
        );
    }
}

fn claim_timeout() -> Duration {
    Duration::seconds(CLAIM_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::auth::password::Pbkdf2Hasher;
    use crate::modules::auth::store::{OutboxStore, UserStore, VerificationTokenStore};
    use crate::modules::storage::JsonDatastore;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Mutex};
    use std::thread;

    /// Sender that remembers what it was asked to send
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<NotificationEmail>>,
    }

    impl RecordingSender {
        fn sent(&self) -> Vec<NotificationEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl NotificationSender for RecordingSender {
        fn send(&self, email: &NotificationEmail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    impl NotificationSender for &RecordingSender {
        fn send(&self, email: &NotificationEmail) -> Result<(), MailError> {
            (**self).send(email)
        }
    }

    /// Sender whose relay is down
    struct FailingSender;

    impl NotificationSender for FailingSender {
        fn send(&self, _email: &NotificationEmail) -> Result<(), MailError> {
            Err(MailError::Transport("connection refused".to_string()))
        }
    }

    /// Datastore that cannot be reached
    struct UnavailableDatastore {
        attempts: Cell<u32>,
    }

    impl Datastore for UnavailableDatastore {
        fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
            self.attempts.set(self.attempts.get() + 1);
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "datastore offline",
            )))
        }
    }

    /// Sender that parks inside its first `send` until released
    struct GatedSender {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        sent: Mutex<Vec<NotificationEmail>>,
        timed_out: AtomicBool,
    }

    impl GatedSender {
        /// The sender, a receiver signalled when the first send starts, and
        /// the handle that lets it finish
        fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let sender = Self {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
                sent: Mutex::new(Vec::new()),
                timed_out: AtomicBool::new(false),
            };
            (sender, entered_rx, release_tx)
        }

        fn sent(&self) -> Vec<NotificationEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl NotificationSender for GatedSender {
        fn send(&self, email: &NotificationEmail) -> Result<(), MailError> {
            let first = {
                let mut sent = self.sent.lock().unwrap();
                sent.push(email.clone());
                sent.len() == 1
            };

            if first {
                self.entered.lock().unwrap().send(()).unwrap();
                let released = self
                    .release
                    .lock()
                    .unwrap()
                    .recv_timeout(std::time::Duration::from_secs(5));
                if released.is_err() {
                    self.timed_out.store(true, Ordering::SeqCst);
                }
            }
            Ok(())
        }
    }

    #[derive(Clone, Copy, Debug)]
    enum FailPoint {
        Enqueue,
        Commit,
    }

    /// Datastore whose transactions break at one step
    struct FlakyDatastore {
        inner: JsonDatastore,
        fail_at: FailPoint,
    }

    struct FlakyTransaction<'a> {
        inner: Box<dyn Transaction + 'a>,
        fail_at: FailPoint,
    }

    fn disk_full() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }

    impl Datastore for FlakyDatastore {
        fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
            Ok(Box::new(FlakyTransaction {
                inner: self.inner.begin()?,
                fail_at: self.fail_at,
            }))
        }
    }

    impl UserStore for FlakyTransaction<'_> {
        fn save_user(&mut self, user: User) -> Result<User, StoreError> {
            self.inner.save_user(user)
        }

        fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_by_username(username)
        }

        fn delete_user(&mut self, username: &str) -> Result<bool, StoreError> {
            self.inner.delete_user(username)
        }
    }

    impl VerificationTokenStore for FlakyTransaction<'_> {
        fn save_token(
            &mut self,
            token: VerificationToken,
        ) -> Result<VerificationToken, StoreError> {
            self.inner.save_token(token)
        }

        fn find_by_token(&self, token: &str) -> Result<Option<VerificationToken>, StoreError> {
            self.inner.find_by_token(token)
        }
    }

    impl OutboxStore for FlakyTransaction<'_> {
        fn enqueue(&mut self, email: NotificationEmail) -> Result<OutboxId, StoreError> {
            match self.fail_at {
                FailPoint::Enqueue => Err(disk_full()),
                FailPoint::Commit => self.inner.enqueue(email),
            }
        }

        fn pending(&self) -> Result<Vec<OutboxEntry>, StoreError> {
            self.inner.pending()
        }

        fn claim(&mut self, id: OutboxId, stale_after: Duration) -> Result<bool, StoreError> {
            self.inner.claim(id, stale_after)
        }

        fn mark_delivered(&mut self, id: OutboxId) -> Result<(), StoreError> {
            self.inner.mark_delivered(id)
        }

        fn record_failure(&mut self, id: OutboxId, reason: &str) -> Result<(), StoreError> {
            self.inner.record_failure(id, reason)
        }
    }

    impl Transaction for FlakyTransaction<'_> {
        fn commit(self: Box<Self>) -> Result<(), StoreError> {
            match self.fail_at {
                FailPoint::Enqueue => self.inner.commit(),
                FailPoint::Commit => Err(disk_full()),
            }
        }
    }

    type TestService<N> = AccountService<Pbkdf2Hasher, JsonDatastore, N>;

    fn service_with<N: NotificationSender>(sender: N) -> TestService<N> {
        AccountService::new(
            Pbkdf2Hasher::with_iterations(1_000),
            JsonDatastore::in_memory(),
            sender,
            ActivationSettings::default(),
        )
    }

    fn alice() -> RegisterRequest {
        RegisterRequest::new("alice", "Password123!", "alice@example.com")
    }

    fn token_for<N: NotificationSender>(service: &TestService<N>, username: &str) -> String {
        let state = service.datastore().snapshot().unwrap();
        let tokens: Vec<_> = state
            .tokens
            .values()
            .filter(|t| t.username == username)
            .collect();
        assert_eq!(tokens.len(), 1, "expected exactly one token for {}", username);
        tokens[0].token.clone()
    }

    #[test]
    fn test_signup_creates_unverified_user_with_one_token() {
        let service = service_with(RecordingSender::default());
        service.signup(&alice()).unwrap();

        let state = service.datastore().snapshot().unwrap();
        let user = state.users.get("alice").unwrap();
        assert!(!user.is_verified());
        assert_eq!(user.email, "alice@example.com");
        assert_ne!(user.password_hash, "Password123!");
        assert!(Pbkdf2Hasher::default().verify("Password123!", &user.password_hash));

        assert_eq!(state.tokens.len(), 1);
        let token = state.tokens.values().next().unwrap();
        assert_eq!(token.username, "alice");
    }

    #[test]
    fn test_signup_sends_activation_link() {
        let sender = RecordingSender::default();
        let service = service_with(&sender);
        service.signup(&alice()).unwrap();

        let token = token_for(&service, "alice");
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "alice@example.com");
        assert_eq!(sent[0].subject, "Please Activate Your Account");
        assert!(sent[0].body.ends_with(&format!(
            "http://localhost:8080/api/auth/accountVerification/{}",
            token
        )));

        // Delivered mail leaves the outbox
        assert!(service.pending_notifications().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_signup_fails_and_keeps_one_user() {
        let service = service_with(RecordingSender::default());
        service.signup(&alice()).unwrap();

        let second = RegisterRequest::new("alice", "Other456!pass", "other@example.com");
        let err = service.signup(&second).unwrap_err();
        assert!(matches!(
            err,
            AuthError::Registration {
                source: StoreError::DuplicateUsername(_)
            }
        ));
        assert_eq!(err.to_string(), "Registration failed");

        let state = service.datastore().snapshot().unwrap();
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.users["alice"].email, "alice@example.com");
        // The failed attempt left no token or mail behind
        assert_eq!(state.tokens.len(), 1);
        assert!(state.outbox.is_empty());
        assert_eq!(service.sender.sent().len(), 1);
    }

    #[test]
    fn test_signup_with_unavailable_store_is_registration_error() {
        let service = AccountService::new(
            Pbkdf2Hasher::with_iterations(1_000),
            UnavailableDatastore {
                attempts: Cell::new(0),
            },
            RecordingSender::default(),
            ActivationSettings::default(),
        );

        let err = service.signup(&alice()).unwrap_err();
        assert!(matches!(err, AuthError::Registration { source: StoreError::Io(_) }));
        assert_eq!(err.to_string(), "Registration failed");
        assert!(service.sender.sent().is_empty());
        assert_eq!(service.datastore().attempts.get(), 1);
    }

    #[test]
    fn test_mail_failure_keeps_account_and_queues_email() {
        let service = service_with(FailingSender);
        service.signup(&alice()).unwrap();

        let state = service.datastore().snapshot().unwrap();
        assert!(state.users.contains_key("alice"));

        let pending = service.pending_notifications().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn test_dispatch_outbox_retries_queued_mail() {
        let failing = service_with(FailingSender);
        failing.signup(&alice()).unwrap();
        let report = failing.dispatch_outbox().unwrap();
        assert_eq!(
            report,
            DispatchReport {
                delivered: 0,
                failed: 1,
                skipped: 0
            }
        );
        assert_eq!(failing.pending_notifications().unwrap()[0].attempts, 2);

        // Same data, working relay
        let state = failing.datastore().snapshot().unwrap();
        let datastore = JsonDatastore::in_memory();
        {
            let mut tx = datastore.begin().unwrap();
            for user in state.users.values() {
                tx.save_user(user.clone()).unwrap();
            }
            for entry in &state.outbox {
                tx.enqueue(entry.email.clone()).unwrap();
            }
            tx.commit().unwrap();
        }
        let sender = RecordingSender::default();
        let working = AccountService::new(
            Pbkdf2Hasher::with_iterations(1_000),
            datastore,
            &sender,
            ActivationSettings::default(),
        );

        let report = working.dispatch_outbox().unwrap();
        assert_eq!(
            report,
            DispatchReport {
                delivered: 1,
                failed: 0,
                skipped: 0
            }
        );
        assert_eq!(sender.sent().len(), 1);
        assert!(working.pending_notifications().unwrap().is_empty());

        // Nothing left to send
        assert_eq!(working.dispatch_outbox().unwrap(), DispatchReport::default());
    }

    #[test]
    fn test_verify_account_marks_user_verified() {
        let service = service_with(RecordingSender::default());
        service.signup(&alice()).unwrap();
        let token = token_for(&service, "alice");

        service.verify_account(&token).unwrap();

        let state = service.datastore().snapshot().unwrap();
        assert!(state.users["alice"].is_verified());
    }

    #[test]
    fn test_verify_changes_nothing_but_status() {
        let service = service_with(RecordingSender::default());
        service.signup(&alice()).unwrap();
        let before = service.datastore().snapshot().unwrap().users["alice"].clone();

        service.verify_account(&token_for(&service, "alice")).unwrap();

        let after = service.datastore().snapshot().unwrap().users["alice"].clone();
        assert_eq!(after.id, before.id);
        assert_eq!(after.password_hash, before.password_hash);
        assert_eq!(after.email, before.email);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.verification_status, VerificationStatus::Verified);
    }

    #[test]
    fn test_verify_unknown_token_is_invalid() {
        let service = service_with(RecordingSender::default());
        service.signup(&alice()).unwrap();

        let err = service.verify_account("nonexistent-token").unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        // No partial matches either
        let token = token_for(&service, "alice");
        assert!(matches!(
            service.verify_account(&token[..8]),
            Err(AuthError::InvalidToken)
        ));

        let state = service.datastore().snapshot().unwrap();
        assert!(!state.users["alice"].is_verified());
    }

    #[test]
    fn test_verify_twice_is_idempotent() {
        let service = service_with(RecordingSender::default());
        service.signup(&alice()).unwrap();
        let token = token_for(&service, "alice");

        service.verify_account(&token).unwrap();
        service.verify_account(&token).unwrap();

        let state = service.datastore().snapshot().unwrap();
        assert!(state.users["alice"].is_verified());
    }

    #[test]
    fn test_verify_token_of_deleted_user() {
        let service = service_with(RecordingSender::default());
        service.signup(&alice()).unwrap();
        let token = token_for(&service, "alice");

        let mut tx = service.datastore().begin().unwrap();
        assert!(tx.delete_user("alice").unwrap());
        tx.commit().unwrap();

        match service.verify_account(&token) {
            Err(AuthError::UserNotFound { username }) => assert_eq!(username, "alice"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_verify_with_unavailable_store_is_storage_error() {
        let service = AccountService::new(
            Pbkdf2Hasher::with_iterations(1_000),
            UnavailableDatastore {
                attempts: Cell::new(0),
            },
            RecordingSender::default(),
            ActivationSettings::default(),
        );

        assert!(matches!(
            service.verify_account("anything"),
            Err(AuthError::Storage(StoreError::Io(_)))
        ));
    }

    #[test]
    fn test_concurrent_signups_with_same_username() {
        let service = service_with(RecordingSender::default());

        let results: Vec<Result<(), AuthError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let service = &service;
                    scope.spawn(move || {
                        service.signup(&RegisterRequest::new(
                            "alice",
                            "Password123!",
                            &format!("alice{}@example.com", i),
                        ))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AuthError::Registration { .. })));

        let state = service.datastore().snapshot().unwrap();
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.tokens.len(), 1);
    }

    #[test]
    fn test_custom_activation_settings() {
        let sender = RecordingSender::default();
        let service = AccountService::new(
            Pbkdf2Hasher::with_iterations(1_000),
            JsonDatastore::in_memory(),
            &sender,
            ActivationSettings {
                app_name: "Test Forum".to_string(),
                activation_base_url: "https://forum.example/verify/".to_string(),
            },
        );
        service.signup(&alice()).unwrap();

        let token = token_for(&service, "alice");
        let body = &sender.sent()[0].body;
        assert!(body.contains("Test Forum"));
        assert!(body.ends_with(&format!("https://forum.example/verify/{}", token)));
    }

    #[test]
    fn test_failed_signup_write_leaves_nothing_behind() {
        for fail_at in [FailPoint::Enqueue, FailPoint::Commit] {
            let sender = RecordingSender::default();
            let service = AccountService::new(
                Pbkdf2Hasher::with_iterations(1_000),
                FlakyDatastore {
                    inner: JsonDatastore::in_memory(),
                    fail_at,
                },
                &sender,
                ActivationSettings::default(),
            );

            let err = service.signup(&alice()).unwrap_err();
            assert!(
                matches!(err, AuthError::Registration { source: StoreError::Io(_) }),
                "{:?}: {:?}",
                fail_at,
                err
            );

            let state = service.datastore().inner.snapshot().unwrap();
            assert!(state.users.is_empty(), "{:?}", fail_at);
            assert!(state.tokens.is_empty(), "{:?}", fail_at);
            assert!(state.outbox.is_empty(), "{:?}", fail_at);
            assert!(sender.sent().is_empty(), "{:?}", fail_at);
        }
    }

    /// Alice's account, token and activation mail, committed but not sent
    fn seed_unsent_signup<N: NotificationSender>(service: &TestService<N>) -> String {
        let token = "seeded-token".to_string();
        let mut tx = service.datastore().begin().unwrap();
        let user = tx
            .save_user(User::new("alice", "hash".to_string(), "alice@example.com"))
            .unwrap();
        tx.save_token(VerificationToken::new(token.clone(), &user))
            .unwrap();
        tx.enqueue(activation_email(
            &ActivationSettings::default(),
            &user.email,
            &token,
        ))
        .unwrap();
        tx.commit().unwrap();
        token
    }

    #[test]
    fn test_verify_runs_while_dispatch_is_sending() {
        let (sender, entered, release) = GatedSender::new();
        let service = service_with(sender);
        let token = seed_unsent_signup(&service);

        let report = thread::scope(|scope| {
            let dispatch = scope.spawn(|| service.dispatch_outbox());
            entered.recv().unwrap();

            // The datastore is free while the mail is in flight
            service.verify_account(&token).unwrap();
            release.send(()).unwrap();

            dispatch.join().unwrap().unwrap()
        });

        assert!(!service.sender.timed_out.load(Ordering::SeqCst));
        assert_eq!(report.delivered, 1);
        let state = service.datastore().snapshot().unwrap();
        assert!(state.users["alice"].is_verified());
        assert!(state.outbox.is_empty());
    }

    #[test]
    fn test_dispatch_skips_mail_signup_is_delivering() {
        let (sender, entered, release) = GatedSender::new();
        let service = service_with(sender);

        let report = thread::scope(|scope| {
            let signup = scope.spawn(|| service.signup(&alice()));
            entered.recv().unwrap();

            let report = service.dispatch_outbox().unwrap();
            release.send(()).unwrap();

            signup.join().unwrap().unwrap();
            report
        });

        assert_eq!(
            report,
            DispatchReport {
                delivered: 0,
                failed: 0,
                skipped: 1
            }
        );
        assert!(!service.sender.timed_out.load(Ordering::SeqCst));
        assert_eq!(service.sender.sent().len(), 1);
        assert!(service.datastore().snapshot().unwrap().outbox.is_empty());
        assert_eq!(service.dispatch_outbox().unwrap(), DispatchReport::default());
    }
}
