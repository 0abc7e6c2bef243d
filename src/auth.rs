use std::path::Path;

use anyhow::{bail, Result};

use crate::api::{RepoApi, RepoRef};
use crate::config::{self, AccessToken};

#[derive(Debug)]
pub struct Credentials {
    pub access_token: AccessToken,
    pub default_repo: Option<String>,
}

pub fn load_credentials(config_path: &Path) -> Result<Credentials> {
    let config = config::load(config_path)?;
    let Some(config) = config else {
        bail!("You need to login into your BeanHub account with \"bh login\" command first");
    };
    let default_repo = config.default_repo().map(str::to_string);
    let Some(access_token) = config.access_token else {
        bail!("You need to login into your BeanHub account with \"bh login\" command first");
    };
    Ok(Credentials {
        access_token,
        default_repo,
    })
}

/// The repo from the command line wins over the default one in the config. Without either,
/// the account's repositories are listed and the single active one is used.
pub async fn resolve_repo(
    api: &impl RepoApi,
    repo: Option<&str>,
    default_repo: Option<&str>,
) -> Result<RepoRef> {
    if let Some(repo) = repo.or(default_repo) {
        return repo.parse();
    }
    let repositories = api.list_repositories().await?;
    let mut active = repositories.into_iter().filter(|repo| repo.active);
    match (active.next(), active.next()) {
        (Some(repo), None) => {
            log::info!(
                "No repo provided, using the only active repo {}/{}",
                repo.username,
                repo.name
            );
            Ok(RepoRef {
                username: repo.username,
                name: repo.name,
            })
        }
        _ => bail!(
            "You need to provide a repo by -r argument, such as \"myuser/myrepo\" or define a default repo in your config file"
        ),
    }
}

#[cfg(test)]
pub(crate) mod testutils {
    use crate::api::{models::Repository, ApiError, RepoApi};

    pub struct FakeRepoApi {
        pub repositories: Vec<Repository>,
    }

    pub fn repository(username: &str, name: &str, active: bool) -> Repository {
        Repository {
            username: username.to_string(),
            name: name.to_string(),
            repo_type: Some("CONNECT".to_string()),
            public: false,
            active,
        }
    }

    impl RepoApi for FakeRepoApi {
        async fn list_repositories(&self) -> Result<Vec<Repository>, ApiError> {
            Ok(self.repositories.clone())
        }
    }
}
