use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::api::{RosterApi, RosterUpload, UploadSummary};
use crate::error::{RosterError, RosterResult};
use crate::export::{ExportFile, ExportQuery};
use crate::models::{Category, StudentId, StudentRecord};
use crate::projection::ViewState;
use crate::refresh::{self, BulkRefresh};
use crate::roster::RosterStore;

/// How much of the roster an export will cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportScope {
    pub shown: usize,
    pub total: usize,
}

impl ExportScope {
    pub fn is_everything(&self) -> bool {
        self.shown == self.total
    }
}

pub struct Dashboard {
    api: Arc<dyn RosterApi>,
    token: String,
    category: Category,
    store: RosterStore,
    settle_delay: Duration,
    pub view: ViewState,
}

impl Dashboard {
    /// Opens `category` with an empty roster and loads it from the backend.
    pub async fn open(
        api: Arc<dyn RosterApi>,
        token: impl Into<String>,
        category: Category,
        settle_delay: Duration,
    ) -> RosterResult<Self> {
        let dashboard = Self {
            api,
            token: token.into(),
            category,
            store: RosterStore::new(),
            settle_delay,
            view: ViewState::default(),
        };
        dashboard.reload().await?;
        Ok(dashboard)
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn store(&self) -> &RosterStore {
        &self.store
    }

    /// Replaces the roster with the backend's listing. On failure the
    /// current roster is kept.
    pub async fn reload(&self) -> RosterResult<usize> {
        let lane = self.store.try_lane()?;
        let students = self.api.list_students(&self.token, &self.category).await?;
        let count = students.len();
        self.store.load(&lane, students);
        info!(category = %self.category, count, "roster loaded");
        Ok(count)
    }

    pub fn projected(&self) -> Vec<StudentRecord> {
        let roster = self.store.snapshot();
        self.view.project(&roster).into_iter().cloned().collect()
    }

    pub fn export_scope(&self) -> ExportScope {
        let roster = self.store.snapshot();
        ExportScope {
            shown: self.view.project(&roster).len(),
            total: roster.len(),
        }
    }

    pub async fn refresh_student(&self, id: &StudentId) -> RosterResult<StudentRecord> {
        if self.store.get(id).is_none() {
            return Err(RosterError::validation(
                "student",
                format!("no student with id {id} in {}", self.category),
            ));
        }
        refresh::refresh_single(self.api.as_ref(), &self.token, &self.store, id).await
    }

    pub fn refresh_all(&self) -> RosterResult<BulkRefresh> {
        BulkRefresh::start(
            self.api.clone(),
            self.token.clone(),
            self.store.clone(),
            self.settle_delay,
        )
    }

    /// Requests a spreadsheet of exactly the rows the view shows.
    pub async fn export(&self) -> RosterResult<ExportFile> {
        if self.export_scope().shown == 0 {
            return Err(RosterError::validation(
                "export",
                "no students match the current filters",
            ));
        }
        let query = ExportQuery::from_filter(&self.view.filter);
        debug!(category = %self.category, unfiltered = query.is_unfiltered(), "requesting export");
        self.api
            .export_roster(&self.token, &self.category, &query)
            .await
    }

    /// Deletes every student in the category. The local roster is only
    /// cleared once the backend confirms.
    pub async fn delete_all(&self) -> RosterResult<String> {
        let lane = self.store.try_lane()?;
        let message = self
            .api
            .delete_category(&self.token, &self.category)
            .await?;
        self.store.clear(&lane);
        info!(category = %self.category, "category cleared");
        Ok(message)
    }

    /// Uploads a spreadsheet, then reloads the roster it produced.
    pub async fn upload(&self, upload: RosterUpload) -> RosterResult<UploadSummary> {
        let summary = {
            let _lane = self.store.try_lane()?;
            self.api
                .upload_roster(&self.token, &self.category, upload)
                .await?
        };
        self.reload().await?;
        Ok(summary)
    }
}
