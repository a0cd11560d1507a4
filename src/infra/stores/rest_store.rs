//! REST store: talks to a companion instance of this service over HTTP.
//!
//! Requests carry a service bearer token that must belong to an admin
//! account on the remote side. Every request has the client timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::{BackendKind, Store};
use crate::config::{MAX_PAGE_SIZE, TOKEN_TYPE_BEARER};
use crate::domain::{
    Invoice, InvoiceDraft, InvoiceFilter, InvoiceStatus, NewUser, User, UserChanges, UserResponse,
};
use crate::errors::{AppError, AppResult};

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginReply {
    access_token: String,
    #[serde(default)]
    user: Option<UserResponse>,
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
    role: crate::domain::UserRole,
    phone: Option<&'a str>,
}

#[derive(Serialize)]
struct PasswordBody<'a> {
    password: &'a str,
}

#[derive(Serialize)]
struct CreateInvoiceBody<'a> {
    id: Uuid,
    owner_id: Uuid,
    #[serde(flatten)]
    draft: &'a InvoiceDraft,
}

#[derive(Serialize)]
struct StatusBody {
    status: InvoiceStatus,
}

#[derive(Deserialize)]
struct Page<T> {
    data: Vec<T>,
    meta: PageMeta,
}

#[derive(Deserialize)]
struct PageMeta {
    page: u64,
    total_pages: u64,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: ErrorReplyBody,
}

#[derive(Deserialize)]
struct ErrorReplyBody {
    message: String,
}

pub struct RestStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestStore {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and translate remote status codes into local errors.
    async fn send(&self, request: RequestBuilder) -> AppResult<Response> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorReply>()
            .await
            .map(|reply| reply.error.message)
            .unwrap_or_else(|_| status.to_string());

        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound,
            StatusCode::CONFLICT => AppError::Conflict(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AppError::Validation(message),
            StatusCode::FORBIDDEN => AppError::Forbidden,
            // a rejected service token is a misconfigured tier, not a caller error
            StatusCode::UNAUTHORIZED => {
                AppError::unavailable(format!("REST backend rejected credentials: {}", message))
            }
            _ => AppError::unavailable(format!("REST backend returned {}: {}", status, message)),
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<T> {
        Ok(self.send(request).await?.json::<T>().await?)
    }

    async fn optional<T: DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<Option<T>> {
        match self.json(request).await {
            Ok(value) => Ok(Some(value)),
            Err(AppError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn patch_status(&self, id: Uuid, status: InvoiceStatus) -> AppResult<Invoice> {
        self.json(
            self.client
                .patch(self.url(&format!("/invoices/{}/status", id)))
                .json(&StatusBody { status }),
        )
        .await
    }
}

#[async_trait]
impl Store for RestStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Rest
    }

    async fn ping(&self) -> AppResult<()> {
        self.send(self.client.get(self.url("/health"))).await?;
        Ok(())
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginBody { email, password })
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Ok(None),
            StatusCode::FORBIDDEN => return Err(AppError::Forbidden),
            status if !status.is_success() => {
                return Err(AppError::unavailable(format!("REST login returned {}", status)))
            }
            _ => {}
        }

        let reply: LoginReply = response.json().await?;
        let user = match reply.user {
            Some(user) => user,
            None => {
                self.client
                    .get(self.url("/users/me"))
                    .header(
                        reqwest::header::AUTHORIZATION,
                        format!("{} {}", TOKEN_TYPE_BEARER, reply.access_token),
                    )
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<UserResponse>()
                    .await?
            }
        };
        Ok(Some(User::from(user)))
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let user: Option<UserResponse> = self
            .optional(self.client.get(self.url(&format!("/users/{}", id))))
            .await?;
        Ok(user.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users: Vec<UserResponse> = self
            .json(self.client.get(self.url("/users")).query(&[("email", email)]))
            .await?;
        Ok(users.into_iter().next().map(User::from))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let users: Vec<UserResponse> = self.json(self.client.get(self.url("/users"))).await?;
        Ok(users.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let body = CreateUserBody {
            email: &user.email,
            password: &user.password,
            name: &user.name,
            role: user.role,
            phone: user.phone.as_deref(),
        };
        let created: UserResponse = self
            .json(self.client.post(self.url("/users")).json(&body))
            .await?;
        Ok(User::from(created))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<User> {
        let updated: UserResponse = self
            .json(
                self.client
                    .put(self.url(&format!("/users/{}", id)))
                    .json(&changes),
            )
            .await?;
        Ok(User::from(updated))
    }

    async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()> {
        self.send(
            self.client
                .put(self.url(&format!("/users/{}/password", id)))
                .json(&PasswordBody { password }),
        )
        .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        self.send(self.client.delete(self.url(&format!("/users/{}", id))))
            .await?;
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        self.optional(self.client.get(self.url(&format!("/invoices/{}", id))))
            .await
    }

    async fn list_invoices(&self, filter: InvoiceFilter) -> AppResult<Vec<Invoice>> {
        let mut invoices = Vec::new();
        let mut page = 1u64;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("page", page.to_string()),
                ("per_page", MAX_PAGE_SIZE.to_string()),
            ];
            if let Some(owner_id) = filter.owner_id {
                query.push(("owner_id", owner_id.to_string()));
            }
            if let Some(status) = filter.status {
                query.push(("status", status.as_str().to_string()));
            }
            if let Some(q) = &filter.query {
                query.push(("q", q.clone()));
            }

            let reply: Page<Invoice> = self
                .json(self.client.get(self.url("/invoices")).query(&query))
                .await?;
            invoices.extend(reply.data);

            if reply.meta.page >= reply.meta.total_pages {
                break;
            }
            page += 1;
        }

        Ok(invoices)
    }

    async fn create_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        let draft = invoice.to_draft();
        let created: Invoice = self
            .json(self.client.post(self.url("/invoices")).json(&CreateInvoiceBody {
                id: invoice.id,
                owner_id: invoice.owner_id,
                draft: &draft,
            }))
            .await?;

        if created.status != invoice.status {
            return self.patch_status(invoice.id, invoice.status).await;
        }
        Ok(created)
    }

    async fn update_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        let updated: Invoice = self
            .json(
                self.client
                    .put(self.url(&format!("/invoices/{}", invoice.id)))
                    .json(&invoice.to_draft()),
            )
            .await?;

        if updated.status != invoice.status {
            return self.patch_status(invoice.id, invoice.status).await;
        }
        Ok(updated)
    }

    async fn delete_invoice(&self, id: Uuid) -> AppResult<()> {
        self.send(self.client.delete(self.url(&format!("/invoices/{}", id))))
            .await?;
        Ok(())
    }
}
