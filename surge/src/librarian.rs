use std::time::Duration;

use async_trait::async_trait;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use surge_core::{HttpRequest, IterationContext, IterationError, Scenario};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const READERS_PATH: &str = "/api/readers";

pub const CHECK_LOGIN_OK: &str = "login successful";
pub const CHECK_TOKEN: &str = "token received";
pub const CHECK_READER_CREATED: &str = "create reader status 201";

const THINK_TIME: Duration = Duration::from_secs(1);
const READER_PASSWORD: &str = "Password1!";
const READER_INTERESTS: [&str; 2] = ["fiction", "technology"];
const RANDOM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "maria@gmail.com".to_string(),
            password: "Mariaroberta!123".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewReader<'a> {
    username: String,
    password: &'a str,
    full_name: String,
    interests: [&'a str; 2],
    gdpr_consent: bool,
}

impl NewReader<'_> {
    fn random() -> Self {
        Self {
            username: format!("reader_{}@test.com", random_string(8)),
            password: READER_PASSWORD,
            full_name: format!("Test Reader {}", random_string(5)),
            interests: READER_INTERESTS,
            gdpr_consent: true,
        }
    }
}

/// Logs in as a librarian, then registers one new reader with the returned token.
///
/// A login without a token aborts the iteration before the create step.
#[derive(Debug, Clone)]
pub struct LibrarianScenario {
    credentials: Credentials,
    think_time: Option<Duration>,
}

impl LibrarianScenario {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            think_time: Some(THINK_TIME),
        }
    }

    #[cfg(test)]
    fn without_think_time(mut self) -> Self {
        self.think_time = None;
        self
    }

    async fn login(&self, ctx: &mut IterationContext) -> Result<Option<String>, IterationError> {
        let res = ctx.post_json(LOGIN_PATH, &self.credentials).await?;
        let token = res.json_str("/token").filter(|t| !t.is_empty());

        ctx.check(CHECK_LOGIN_OK, res.status == 200);
        ctx.check(CHECK_TOKEN, token.is_some());
        Ok(token)
    }

    async fn create_reader(
        &self,
        ctx: &mut IterationContext,
        token: &str,
    ) -> Result<(), IterationError> {
        let req = HttpRequest::post_json(ctx.url(READERS_PATH), &NewReader::random())
            .map_err(|e| IterationError::failed(format!("encode reader: {e}")))?
            .with_bearer(token);
        let res = ctx.http(req).await;
        ctx.check(CHECK_READER_CREATED, res.status == 201);
        Ok(())
    }
}

#[async_trait]
impl Scenario for LibrarianScenario {
    async fn iteration(&self, ctx: &mut IterationContext) -> Result<(), IterationError> {
        let Some(token) = self.login(ctx).await? else {
            tracing::error!(vu = ctx.vu_id(), "Login failed, no token");
            return Err(IterationError::aborted("login failed"));
        };

        self.create_reader(ctx, &token).await?;

        if let Some(think) = self.think_time {
            ctx.sleep(think).await;
        }
        Ok(())
    }
}

pub(crate) fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| RANDOM_CHARSET[rng.gen_range(0..RANDOM_CHARSET.len())] as char)
        .collect()
}
