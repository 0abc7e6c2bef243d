use std::time::Duration;

use anyhow::{bail, Result};

use crate::api::{AuthApi, AuthSessionPoll, BeanHubClient};
use crate::config::{self, AccessToken};
use crate::environment::Environment;
use crate::poll::{poll_until, PollStatus};

pub async fn main(env: &Environment) -> Result<()> {
    let client = BeanHubClient::new(&env.api_base_url);
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    login(env, &client, &hostname, |url| open::that(url).is_ok()).await
}

pub async fn login(
    env: &Environment,
    api: &impl AuthApi,
    hostname: &str,
    open_browser: impl FnOnce(&str) -> bool,
) -> Result<()> {
    let mut config = config::load(&env.config_path)?.unwrap_or_default();
    if config.access_token.is_some() {
        // TODO Offer to log out the existing session instead of failing
        bail!(
            "Already logged in, if you want to login again, please delete the config file at {} first",
            env.config_path.display()
        );
    }

    log::info!("Creating auth session ...");
    let token = run_login(api, hostname, env.poll_interval, open_browser).await?;
    config.access_token = Some(token);
    config::save(&config, &env.config_path)?;
    log::info!(
        "Session access granted, saved config to {}",
        env.config_path.display()
    );
    log::info!("done");
    Ok(())
}

/// Device login: create an auth session, let the user grant it in the browser and wait for the token
pub async fn run_login(
    api: &impl AuthApi,
    hostname: &str,
    poll_interval: Duration,
    open_browser: impl FnOnce(&str) -> bool,
) -> Result<AccessToken> {
    let session = api.create_auth_session(hostname).await?;
    log::info!("Auth Code: {}", console::style(&session.code).bold());
    if !open_browser(&session.auth_url) {
        log::info!(
            "Cannot open auth url, please open it manually in your browser: {}",
            session.auth_url
        );
    }

    log::info!(
        "Waiting granting access for current auth session: {} ...",
        session.id
    );
    let session = &session;
    let granted = poll_until(poll_interval, move || async move {
        anyhow::Ok(match api.poll_auth_session(session).await? {
            AuthSessionPoll::Granted(granted) => PollStatus::Complete(granted),
            AuthSessionPoll::NotReady => {
                log::debug!("Session access not granted yet, try again later");
                PollStatus::Pending
            }
            AuthSessionPoll::Unexpected(status) => PollStatus::Failed(format!(
                "Failed to fetch token, encountered unexpected status code {status}"
            )),
        })
    })
    .await?;
    Ok(AccessToken::new(granted.token))
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
    };

    use super::*;
    use crate::api::{
        models::{AuthSessionPollResponse, AuthSessionResponse},
        ApiError,
    };
    use crate::config::Config;

    struct FakeAuthApi {
        polls: RefCell<VecDeque<AuthSessionPoll>>,
        poll_count: Cell<usize>,
        hostname: RefCell<Option<String>>,
    }

    impl FakeAuthApi {
        fn new(polls: Vec<AuthSessionPoll>) -> Self {
            Self {
                polls: RefCell::new(polls.into()),
                poll_count: Cell::new(0),
                hostname: RefCell::new(None),
            }
        }
    }

    impl AuthApi for FakeAuthApi {
        async fn create_auth_session(
            &self,
            hostname: &str,
        ) -> Result<AuthSessionResponse, ApiError> {
            *self.hostname.borrow_mut() = Some(hostname.to_string());
            Ok(AuthSessionResponse {
                id: "session0".to_string(),
                code: "MOCK_CODE".to_string(),
                auth_url: "https://app.beanhub.io/auth/session0".to_string(),
                secret_token: "MOCK_SECRET".to_string(),
            })
        }

        async fn poll_auth_session(
            &self,
            session: &AuthSessionResponse,
        ) -> Result<AuthSessionPoll, ApiError> {
            assert_eq!("MOCK_SECRET", session.secret_token);
            self.poll_count.set(self.poll_count.get() + 1);
            Ok(self
                .polls
                .borrow_mut()
                .pop_front()
                .expect("Polled more often than expected"))
        }
    }

    fn granted(token: &str) -> AuthSessionPoll {
        AuthSessionPoll::Granted(AuthSessionPollResponse {
            token: token.to_string(),
            repositories: None,
        })
    }

    #[tokio::test]
    async fn login_after_two_pending_polls() {
        let tempdir = tempfile::tempdir().unwrap();
        let env = Environment::for_tests(tempdir.path());
        let api = FakeAuthApi::new(vec![
            AuthSessionPoll::NotReady,
            AuthSessionPoll::NotReady,
            granted("MOCK_TOKEN"),
        ]);
        let opened = RefCell::new(Vec::new());

        login(&env, &api, "myhost", |url| {
            opened.borrow_mut().push(url.to_string());
            true
        })
        .await
        .unwrap();

        assert_eq!(3, api.poll_count.get());
        assert_eq!(
            vec!["https://app.beanhub.io/auth/session0".to_string()],
            *opened.borrow()
        );
        assert_eq!(Some("myhost".to_string()), *api.hostname.borrow());
        let config = config::load(&env.config_path).unwrap().unwrap();
        assert_eq!("MOCK_TOKEN", config.access_token.unwrap().get());
    }

    #[tokio::test]
    async fn browser_failure_is_not_fatal() {
        let tempdir = tempfile::tempdir().unwrap();
        let env = Environment::for_tests(tempdir.path());
        let api = FakeAuthApi::new(vec![granted("MOCK_TOKEN")]);

        login(&env, &api, "myhost", |_| false).await.unwrap();
        assert_eq!(1, api.poll_count.get());
    }

    #[tokio::test]
    async fn already_logged_in() {
        let tempdir = tempfile::tempdir().unwrap();
        let env = Environment::for_tests(tempdir.path());
        config::save(
            &Config {
                access_token: Some(AccessToken::new("OLD_TOKEN".to_string())),
                repo: None,
            },
            &env.config_path,
        )
        .unwrap();
        let api = FakeAuthApi::new(vec![]);

        let err = login(&env, &api, "myhost", |_| true).await.unwrap_err();
        assert!(err.to_string().starts_with("Already logged in"));
        assert_eq!(0, api.poll_count.get());
        assert_eq!(None, *api.hostname.borrow());
    }

    #[tokio::test]
    async fn unexpected_poll_status() {
        let tempdir = tempfile::tempdir().unwrap();
        let env = Environment::for_tests(tempdir.path());
        let api = FakeAuthApi::new(vec![AuthSessionPoll::NotReady, AuthSessionPoll::Unexpected(500)]);

        let err = login(&env, &api, "myhost", |_| true).await.unwrap_err();
        assert_eq!(
            "Failed to fetch token, encountered unexpected status code 500",
            err.to_string()
        );
        assert_eq!(2, api.poll_count.get());
        assert!(!env.config_path.exists());
    }

    #[tokio::test]
    async fn keeps_default_repo() {
        let tempdir = tempfile::tempdir().unwrap();
        let env = Environment::for_tests(tempdir.path());
        config::save(
            &Config {
                access_token: None,
                repo: Some(crate::config::Repository {
                    default: Some("myuser/myrepo".to_string()),
                }),
            },
            &env.config_path,
        )
        .unwrap();
        let api = FakeAuthApi::new(vec![granted("MOCK_TOKEN")]);

        login(&env, &api, "myhost", |_| true).await.unwrap();
        let config = config::load(&env.config_path).unwrap().unwrap();
        assert_eq!(Some("myuser/myrepo"), config.default_repo());
    }
}
