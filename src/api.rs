//! REST client for the roster backend.
//!
//! `RosterApi` lists every backend operation the dashboard consumes. The
//! production implementation is `HttpRosterApi`; tests use the in-memory
//! fake in `testing`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{RosterError, RosterResult};
use crate::export::{default_file_name, file_name_from_disposition, ExportFile, ExportQuery};
use crate::models::{Category, Profile, StudentId, StudentRecord, UserAccount};

#[derive(Debug, Clone, PartialEq)]
pub struct LoginGrant {
    pub token: String,
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadSummary {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// A spreadsheet picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl RosterUpload {
    pub async fn from_path(path: &Path) -> RosterResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| RosterError::validation("upload", "path has no file name"))?;
        check_spreadsheet_name(file_name)?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            file_name: file_name.to_string(),
            bytes,
        })
    }
}

/// Only Excel workbooks are accepted by the ingestion service.
pub fn check_spreadsheet_name(file_name: &str) -> RosterResult<()> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
        Ok(())
    } else {
        Err(RosterError::validation(
            "upload",
            format!("`{file_name}` is not an Excel file (.xlsx or .xls)"),
        ))
    }
}

#[async_trait]
pub trait RosterApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> RosterResult<LoginGrant>;

    async fn get_profile(&self, token: &str) -> RosterResult<Profile>;

    async fn list_students(&self, token: &str, category: &Category)
        -> RosterResult<Vec<StudentRecord>>;

    /// Re-scrapes one student and returns the full updated record.
    async fn refresh_student(&self, token: &str, id: &StudentId) -> RosterResult<StudentRecord>;

    async fn delete_category(&self, token: &str, category: &Category) -> RosterResult<String>;

    async fn export_roster(
        &self,
        token: &str,
        category: &Category,
        query: &ExportQuery,
    ) -> RosterResult<ExportFile>;

    async fn upload_roster(
        &self,
        token: &str,
        category: &Category,
        upload: RosterUpload,
    ) -> RosterResult<UploadSummary>;

    async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> RosterResult<String>;

    async fn create_account(&self, token: &str, username: &str, password: &str)
        -> RosterResult<String>;

    async fn list_users(&self, token: &str) -> RosterResult<Vec<UserAccount>>;

    async fn update_user(&self, token: &str, username: &str, password: &str)
        -> RosterResult<String>;

    async fn delete_user(&self, token: &str, username: &str) -> RosterResult<String>;

    async fn health(&self) -> RosterResult<HealthStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Login,
    Profile,
    ListStudents,
    RefreshStudent,
    DeleteCategory,
    Export,
    Upload,
    ChangePassword,
    CreateAccount,
    ListUsers,
    UpdateUser,
    DeleteUser,
    Health,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Login => "login",
            Operation::Profile => "load profile",
            Operation::ListStudents => "list students",
            Operation::RefreshStudent => "refresh student",
            Operation::DeleteCategory => "delete category",
            Operation::Export => "export",
            Operation::Upload => "upload",
            Operation::ChangePassword => "change password",
            Operation::CreateAccount => "create account",
            Operation::ListUsers => "list users",
            Operation::UpdateUser => "update user",
            Operation::DeleteUser => "delete user",
            Operation::Health => "health check",
        }
    }

}

/// Only 401 ends the session. Any other rejection is reported against the
/// operation that caused it.
fn classify(operation: Operation, status: u16, detail: Option<String>) -> RosterError {
    let message = detail.unwrap_or_else(|| format!("server responded with HTTP {status}"));
    if status == 401 {
        RosterError::auth(message)
    } else {
        RosterError::fetch(operation.name(), message)
    }
}

fn transport_error(operation: Operation, err: reqwest::Error) -> RosterError {
    if err.is_timeout() {
        RosterError::fetch(operation.name(), "request timed out")
    } else {
        RosterError::fetch(operation.name(), err.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_text(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(text) => Some(text),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct LoginBody {
    access_token: String,
    user: Profile,
}

#[derive(Deserialize)]
struct StudentList {
    students: Vec<StudentRecord>,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserList {
    Bare(Vec<UserAccount>),
    Wrapped { users: Vec<UserAccount> },
}

pub struct HttpRosterApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpRosterApi {
    pub fn new(config: &ClientConfig) -> RosterResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| RosterError::fetch("build HTTP client", err.to_string()))?;

        Ok(Self {
            client,
            base: config.api_url.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> RosterResult<Url> {
        build_endpoint(&self.base, segments)
    }

    async fn send(
        &self,
        operation: Operation,
        request: reqwest::RequestBuilder,
    ) -> RosterResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(operation, err))?;

        let status = response.status();
        debug!(operation = operation.name(), status = status.as_u16(), "backend responded");
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(ErrorBody::into_text);
        Err(classify(operation, status.as_u16(), detail))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: reqwest::RequestBuilder,
    ) -> RosterResult<T> {
        let response = self.send(operation, request).await?;
        response.json::<T>().await.map_err(|err| {
            RosterError::fetch(operation.name(), format!("unexpected response: {err}"))
        })
    }

    async fn send_message(
        &self,
        operation: Operation,
        request: reqwest::RequestBuilder,
    ) -> RosterResult<String> {
        let body: MessageBody = self.send_json(operation, request).await?;
        Ok(body.message)
    }
}

fn build_endpoint(base: &Url, segments: &[&str]) -> RosterResult<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| RosterError::validation("api url", format!("`{base}` cannot be a base URL")))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

#[async_trait]
impl RosterApi for HttpRosterApi {
    async fn login(&self, username: &str, password: &str) -> RosterResult<LoginGrant> {
        let url = self.endpoint(&["auth", "login"])?;
        let body = serde_json::json!({ "username": username, "password": password });
        let login: LoginBody = self
            .send_json(Operation::Login, self.client.post(url).json(&body))
            .await?;
        Ok(LoginGrant {
            token: login.access_token,
            profile: login.user,
        })
    }

    async fn get_profile(&self, token: &str) -> RosterResult<Profile> {
        let url = self.endpoint(&["profile"])?;
        self.send_json(Operation::Profile, self.client.get(url).bearer_auth(token))
            .await
    }

    async fn list_students(
        &self,
        token: &str,
        category: &Category,
    ) -> RosterResult<Vec<StudentRecord>> {
        let url = self.endpoint(&["students", category.as_str()])?;
        let list: StudentList = self
            .send_json(Operation::ListStudents, self.client.get(url).bearer_auth(token))
            .await?;
        Ok(list.students)
    }

    async fn refresh_student(&self, token: &str, id: &StudentId) -> RosterResult<StudentRecord> {
        let url = self.endpoint(&["students", "fetch-single", id.as_str()])?;
        self.send_json(
            Operation::RefreshStudent,
            self.client.post(url).bearer_auth(token),
        )
        .await
    }

    async fn delete_category(&self, token: &str, category: &Category) -> RosterResult<String> {
        let url = self.endpoint(&["students", category.as_str()])?;
        self.send_message(
            Operation::DeleteCategory,
            self.client.delete(url).bearer_auth(token),
        )
        .await
    }

    async fn export_roster(
        &self,
        token: &str,
        category: &Category,
        query: &ExportQuery,
    ) -> RosterResult<ExportFile> {
        let url = self.endpoint(&["export", category.as_str()])?;
        let request = self
            .client
            .get(url)
            .query(&query.query_pairs())
            .bearer_auth(token);
        let response = self.send(Operation::Export, request).await?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(file_name_from_disposition)
            .unwrap_or_else(|| default_file_name(category));
        let bytes = response
            .bytes()
            .await
            .map_err(|err| transport_error(Operation::Export, err))?;

        Ok(ExportFile {
            file_name,
            bytes: bytes.to_vec(),
        })
    }

    async fn upload_roster(
        &self,
        token: &str,
        category: &Category,
        upload: RosterUpload,
    ) -> RosterResult<UploadSummary> {
        check_spreadsheet_name(&upload.file_name)?;
        let url = self.endpoint(&["upload", category.as_str()])?;
        let form = Form::new().part("file", Part::bytes(upload.bytes).file_name(upload.file_name));
        self.send_json(
            Operation::Upload,
            self.client.post(url).bearer_auth(token).multipart(form),
        )
        .await
    }

    async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> RosterResult<String> {
        let url = self.endpoint(&["profile", "change-password"])?;
        let body = serde_json::json!({
            "current_password": current_password,
            "new_password": new_password,
        });
        self.send_message(
            Operation::ChangePassword,
            self.client.post(url).bearer_auth(token).json(&body),
        )
        .await
    }

    async fn create_account(
        &self,
        token: &str,
        username: &str,
        password: &str,
    ) -> RosterResult<String> {
        let url = self.endpoint(&["auth", "create-account"])?;
        let body = serde_json::json!({ "username": username, "password": password });
        self.send_message(
            Operation::CreateAccount,
            self.client.post(url).bearer_auth(token).json(&body),
        )
        .await
    }

    async fn list_users(&self, token: &str) -> RosterResult<Vec<UserAccount>> {
        let url = self.endpoint(&["users"])?;
        let users: UserList = self
            .send_json(Operation::ListUsers, self.client.get(url).bearer_auth(token))
            .await?;
        Ok(match users {
            UserList::Bare(users) | UserList::Wrapped { users } => users,
        })
    }

    async fn update_user(
        &self,
        token: &str,
        username: &str,
        password: &str,
    ) -> RosterResult<String> {
        let url = self.endpoint(&["users", username])?;
        let body = serde_json::json!({ "password": password });
        self.send_message(
            Operation::UpdateUser,
            self.client.put(url).bearer_auth(token).json(&body),
        )
        .await
    }

    async fn delete_user(&self, token: &str, username: &str) -> RosterResult<String> {
        let url = self.endpoint(&["users", username])?;
        self.send_message(
            Operation::DeleteUser,
            self.client.delete(url).bearer_auth(token),
        )
        .await
    }

    async fn health(&self) -> RosterResult<HealthStatus> {
        let url = self.endpoint(&["health"])?;
        self.send_json(Operation::Health, self.client.get(url)).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let base = Url::parse("http://localhost:8000/api").unwrap();
        let url = build_endpoint(&base, &["students", "fetch-single", "42"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/students/fetch-single/42");

        let trailing = Url::parse("https://roster.example.com/api/").unwrap();
        let url = build_endpoint(&trailing, &["users", "jo doe"]).unwrap();
        assert_eq!(url.as_str(), "https://roster.example.com/api/users/jo%20doe");
    }

    #[test]
    fn unauthorized_is_always_auth() {
        let err = classify(Operation::ListStudents, 401, Some("Invalid or expired token".into()));
        assert!(err.is_auth());
        assert_eq!(err.to_string(), "Invalid or expired token");
    }

    #[test]
    fn rejected_account_changes_keep_the_session() {
        let err = classify(
            Operation::ChangePassword,
            400,
            Some("Current password is incorrect".into()),
        );
        assert!(!err.is_auth());
        assert_eq!(
            err.to_string(),
            "change password failed: Current password is incorrect"
        );

        let err = classify(Operation::CreateAccount, 400, Some("Username already exists".into()));
        assert!(matches!(err, RosterError::Fetch { operation: "create account", .. }));

        let err = classify(Operation::Login, 401, Some("Invalid username or password".into()));
        assert!(err.is_auth());
    }

    #[test]
    fn other_failures_are_fetch_errors() {
        let err = classify(Operation::RefreshStudent, 404, Some("Student not found".into()));
        assert!(matches!(err, RosterError::Fetch { operation: "refresh student", .. }));

        let err = classify(Operation::ChangePassword, 500, None);
        assert!(!err.is_auth());
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn error_body_detail_may_be_structured() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#)
                .unwrap();
        assert!(body.into_text().unwrap().contains("field required"));

        let body: ErrorBody = serde_json::from_str(r#"{"detail": "Not authenticated"}"#).unwrap();
        assert_eq!(body.into_text().as_deref(), Some("Not authenticated"));
    }

    #[test]
    fn login_body_maps_to_grant_fields() {
        let body: LoginBody = serde_json::from_str(
            r#"{"access_token": "abc", "token_type": "bearer",
                "user": {"id": 3, "username": "ops", "is_admin": false}}"#,
        )
        .unwrap();
        assert_eq!(body.access_token, "abc");
        assert_eq!(body.user.username, "ops");
    }

    #[test]
    fn user_list_accepts_both_shapes() {
        let bare: UserList = serde_json::from_str(r#"[{"username": "a"}]"#).unwrap();
        let wrapped: UserList =
            serde_json::from_str(r#"{"users": [{"username": "b", "is_admin": true}]}"#).unwrap();
        let count = |list: UserList| match list {
            UserList::Bare(users) | UserList::Wrapped { users } => users.len(),
        };
        assert_eq!(count(bare), 1);
        assert_eq!(count(wrapped), 1);
    }

    #[test]
    fn spreadsheet_extension_is_checked() {
        assert!(check_spreadsheet_name("cohort.XLSX").is_ok());
        assert!(check_spreadsheet_name("cohort.xls").is_ok());
        assert!(check_spreadsheet_name("cohort.csv").is_err());
    }

    #[tokio::test]
    async fn upload_from_path_rejects_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, b"name,roll").unwrap();
        let err = RosterUpload::from_path(&path).await.unwrap_err();
        assert!(matches!(err, RosterError::Validation { field: "upload", .. }));

        let path = dir.path().join("roster.xlsx");
        std::fs::write(&path, b"PK").unwrap();
        let upload = RosterUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "roster.xlsx");
        assert_eq!(upload.bytes, b"PK");
    }
}
