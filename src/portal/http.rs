use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{HttpSession, PageContent, PortalClient, PortalError, Session};

static FORM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form").expect("static selector"));
static PASSWORD_INPUT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input[type='password']").expect("static selector"));
static HIDDEN_INPUT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input[type='hidden'][name]").expect("static selector"));

/// `[http]` table of the config file.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HttpPortalOptions {
    /// Form field the username is posted under.
    pub username_field: String,
    pub password_field: String,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for HttpPortalOptions {
    fn default() -> Self {
        Self {
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            request_timeout_seconds: 20,
            user_agent: crate::version::user_agent(),
        }
    }
}

/// Form-login portal client. Every session gets its own cookie jar.
pub struct HttpPortalClient {
    options: HttpPortalOptions,
}

impl Default for HttpPortalClient {
    fn default() -> Self {
        Self::new(HttpPortalOptions::default())
    }
}

impl HttpPortalClient {
    pub fn new(options: HttpPortalOptions) -> Self {
        Self { options }
    }

    fn build_client(&self) -> Result<Client, PortalError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(self.options.request_timeout_seconds.max(1)))
            .user_agent(self.options.user_agent.clone())
            .build()?;
        Ok(client)
    }
}

#[async_trait]
impl PortalClient for HttpPortalClient {
    async fn authenticate(
        &self,
        login_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, PortalError> {
        let client = self.build_client()?;

        let login_page = client.get(login_url).send().await?;
        let status = login_page.status();
        if !status.is_success() {
            return Err(PortalError::Status {
                status: status.as_u16(),
                url: login_url.to_string(),
            });
        }
        let page_url = login_page.url().clone();
        let html = login_page.text().await?;

        let form = LoginForm::parse(&html);
        let action_url = form.action_url(&page_url);
        debug!(action = %action_url, hidden_fields = form.hidden_fields.len(), "Submitting login form.");

        let mut fields = form.hidden_fields;
        fields.push((self.options.username_field.clone(), username.to_string()));
        fields.push((self.options.password_field.clone(), password.to_string()));

        let response = client.post(action_url).form(&fields).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Rejected(format!(
                "login form submission returned status {status}"
            )));
        }
        let body = response.text().await?;
        if shows_login_form(&body) {
            return Err(PortalError::Rejected(
                "login form was shown again; check the credentials".to_string(),
            ));
        }

        Ok(Session::with_http(
            username,
            HttpSession {
                client,
                login_url: page_url,
            },
        ))
    }

    async fn fetch(&self, session: &Session, page_url: &str) -> Result<PageContent, PortalError> {
        let http = session.http().ok_or(PortalError::ForeignSession)?;

        let response = http.client.get(page_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Status {
                status: status.as_u16(),
                url: page_url.to_string(),
            });
        }
        let final_url = response.url().clone();
        if is_same_page(&final_url, &http.login_url) {
            return Err(PortalError::SessionExpired);
        }
        let body = response.text().await?;
        debug!(session = %session.id, url = %final_url, bytes = body.len(), "Fetched page.");

        Ok(PageContent::new(final_url.to_string(), body))
    }
}

/// The login form found on a portal's login page.
#[derive(Debug, Default, PartialEq)]
struct LoginForm {
    action: Option<String>,
    hidden_fields: Vec<(String, String)>,
}

impl LoginForm {
    /// Picks the form holding a password input, falling back to the first form.
    fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let forms: Vec<_> = document.select(&FORM_SELECTOR).collect();
        let form = forms
            .iter()
            .find(|f| f.select(&PASSWORD_INPUT_SELECTOR).next().is_some())
            .or_else(|| forms.first());

        let Some(form) = form else {
            return Self::default();
        };

        let hidden_fields = form
            .select(&HIDDEN_INPUT_SELECTOR)
            .filter_map(|input| {
                let element = input.value();
                let name = element.attr("name")?;
                Some((
                    name.to_string(),
                    element.attr("value").unwrap_or_default().to_string(),
                ))
            })
            .collect();

        Self {
            action: form
                .value()
                .attr("action")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            hidden_fields,
        }
    }

    fn action_url(&self, page_url: &Url) -> Url {
        self.action
            .as_deref()
            .and_then(|action| page_url.join(action).ok())
            .unwrap_or_else(|| page_url.clone())
    }
}

fn shows_login_form(html: &str) -> bool {
    Html::parse_document(html)
        .select(&PASSWORD_INPUT_SELECTOR)
        .next()
        .is_some()
}

fn is_same_page(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.path() == b.path()
}
