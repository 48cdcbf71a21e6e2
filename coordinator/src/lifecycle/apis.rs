//! モックエンドポイントの管理と同期用の読み取り
//!
//! エンドポイントの追加・削除・インポートは稼働中ノードへ設定変更を通知する。

use chrono::Utc;
use mockhub_common::{
    error::{CoordinatorError, CoordinatorResult},
    matcher::{is_same_identity, normalize_path, PathTemplate},
    protocol::{
        ApisDetailQuery, CounterSnapshot, ImportMode, ImportOperation, ImportSummary, NewMockApis,
    },
    types::{ApisSource, HttpMethod, MockApis, MockApisResponse, MockService},
};
use uuid::Uuid;

use super::LifecycleOrchestrator;
use crate::db::map_db_error;

impl LifecycleOrchestrator {
    /// モックエンドポイントを追加
    pub async fn add_apis(&self, service_id: Uuid, new: NewMockApis) -> CoordinatorResult<MockApis> {
        let service = self.require_active(service_id).await?;
        let template = PathTemplate::parse(&new.endpoint)?;
        if let Some(response) = &new.response {
            validate_status(response.status)?;
        }
        if let Some(error) = &new.simulate_error {
            validate_status(error.status)?;
        }

        let endpoint = template.as_str().to_string();
        if self
            .repos
            .apis
            .exists_identity(service_id, new.method, &endpoint)
            .await
            .map_err(map_db_error)?
        {
            return Err(CoordinatorError::Conflict(format!(
                "{} {} already exists in mock service {}",
                new.method.as_str(),
                endpoint,
                service_id
            )));
        }

        let mut apis = build_apis(
            service_id,
            new.summary,
            new.method,
            endpoint,
            ApisSource::Created,
            new.response,
        );
        apis.simulate_error = new.simulate_error;
        apis.pushback = new.pushback;
        self.repos
            .apis
            .insert_apis(&apis)
            .await
            .map_err(map_db_error)?;

        tracing::info!(service_id = %service_id, apis_id = %apis.id, method = apis.method.as_str(), endpoint = %apis.endpoint, "Mock apis added");
        self.notify_changed(&service).await;
        Ok(apis)
    }

    /// モックエンドポイントを削除（カウンターも削除）
    pub async fn delete_apis(&self, apis_id: Uuid) -> CoordinatorResult<()> {
        let apis = self.require_apis(apis_id).await?;
        self.repos
            .counters
            .delete_counter(apis_id)
            .await
            .map_err(map_db_error)?;
        self.repos
            .apis
            .delete_apis(apis_id)
            .await
            .map_err(map_db_error)?;

        tracing::info!(apis_id = %apis_id, service_id = %apis.mock_service_id, "Mock apis deleted");
        if let Some(service) = self.load_active(apis.mock_service_id).await? {
            self.notify_changed(&service).await;
        }
        Ok(())
    }

    /// オペレーションを一括インポート（ANGUS_IMPORT）
    ///
    /// 既存エンドポイントと同一と判定されたものはスキップする。
    pub async fn import_operations(
        &self,
        service_id: Uuid,
        operations: Vec<ImportOperation>,
    ) -> CoordinatorResult<ImportSummary> {
        let service = self.require_active(service_id).await?;
        let mut existing = self.existing_identities(service_id).await?;
        let mut summary = ImportSummary::default();

        for op in operations {
            let template = match PathTemplate::parse(&op.endpoint) {
                Ok(template) => template,
                Err(e) => {
                    tracing::warn!(service_id = %service_id, endpoint = %op.endpoint, error = %e, "Skipping invalid imported operation");
                    summary.skipped += 1;
                    continue;
                }
            };
            let endpoint = template.as_str().to_string();
            if is_duplicate(&existing, op.method, &endpoint) {
                summary.skipped += 1;
                continue;
            }

            let apis = build_apis(
                service_id,
                op.summary,
                op.method,
                endpoint,
                ApisSource::AngusImport,
                op.response,
            );
            self.repos
                .apis
                .insert_apis(&apis)
                .await
                .map_err(map_db_error)?;
            existing.push((apis.method, apis.endpoint.clone()));
            summary.created.push(apis.id);
        }

        self.finish_import(&service, &summary).await;
        Ok(summary)
    }

    /// 実APIからインポート（コピーまたはライブ参照）
    pub async fn import_real_apis(
        &self,
        service_id: Uuid,
        real_api_ids: &[Uuid],
        mode: ImportMode,
    ) -> CoordinatorResult<ImportSummary> {
        let service = self.require_active(service_id).await?;
        let mut existing = self.existing_identities(service_id).await?;
        let mut summary = ImportSummary::default();

        for &real_api_id in real_api_ids {
            let Some(real) = self
                .repos
                .real_apis
                .get_real_api(real_api_id)
                .await
                .map_err(map_db_error)?
            else {
                summary.missing.push(real_api_id);
                continue;
            };
            if real.project_id != service.project_id {
                tracing::warn!(real_api_id = %real_api_id, service_id = %service_id, "Skipping real api from another project");
                summary.skipped += 1;
                continue;
            }
            let endpoint = match PathTemplate::parse(&real.endpoint) {
                Ok(template) => template.as_str().to_string(),
                Err(_) => normalize_path(&real.endpoint),
            };
            if is_duplicate(&existing, real.method, &endpoint) {
                summary.skipped += 1;
                continue;
            }

            let source = match mode {
                ImportMode::Copy => ApisSource::CopyApis,
                ImportMode::Assoc => ApisSource::AssocApis {
                    api_id: Some(real.id),
                },
            };
            let apis = build_apis(service_id, real.summary, real.method, endpoint, source, None);
            self.repos
                .apis
                .insert_apis(&apis)
                .await
                .map_err(map_db_error)?;
            existing.push((apis.method, apis.endpoint.clone()));
            summary.created.push(apis.id);
        }

        self.finish_import(&service, &summary).await;
        Ok(summary)
    }

    /// Agentからのカウンター差分を累積に加算
    pub async fn apply_counters(
        &self,
        service_id: Uuid,
        delta: &CounterSnapshot,
    ) -> CoordinatorResult<u64> {
        if self
            .repos
            .services
            .get_service(service_id)
            .await
            .map_err(map_db_error)?
            .is_none()
        {
            return Err(CoordinatorError::ServiceNotFound(service_id));
        }
        let applied = self
            .repos
            .counters
            .apply_delta(service_id, delta)
            .await
            .map_err(map_db_error)?;
        tracing::debug!(service_id = %service_id, entries = delta.len(), applied, "Counters applied");
        Ok(applied)
    }

    /// サービスの累積カウンター
    pub async fn counters(&self, service_id: Uuid) -> CoordinatorResult<CounterSnapshot> {
        self.require_active(service_id).await?;
        self.repos
            .counters
            .counters_by_service(service_id)
            .await
            .map_err(map_db_error)
    }

    /// 同期用: サービス詳細（削除済みは見つからない扱い）
    pub async fn service_detail(&self, service_id: Uuid) -> CoordinatorResult<MockService> {
        self.require_active(service_id).await
    }

    /// 同期用: サービスのエンドポイント一覧（フィルタ付き）
    pub async fn apis_detail(
        &self,
        service_id: Uuid,
        query: &ApisDetailQuery,
    ) -> CoordinatorResult<Vec<MockApis>> {
        self.require_active(service_id).await?;
        let endpoint = query.endpoint.as_deref().map(normalize_path);
        let apis = self
            .repos
            .apis
            .list_by_service(service_id)
            .await
            .map_err(map_db_error)?;

        Ok(apis
            .into_iter()
            .filter(|a| query.method.map_or(true, |m| a.method == m))
            .filter(|a| {
                endpoint
                    .as_deref()
                    .map_or(true, |e| normalize_path(&a.endpoint) == e)
            })
            .collect())
    }

    async fn existing_identities(
        &self,
        service_id: Uuid,
    ) -> CoordinatorResult<Vec<(HttpMethod, String)>> {
        let apis = self
            .repos
            .apis
            .list_by_service(service_id)
            .await
            .map_err(map_db_error)?;
        Ok(apis.into_iter().map(|a| (a.method, a.endpoint)).collect())
    }

    async fn finish_import(&self, service: &MockService, summary: &ImportSummary) {
        tracing::info!(
            service_id = %service.id,
            created = summary.created.len(),
            skipped = summary.skipped,
            missing = summary.missing.len(),
            "Import finished"
        );
        if !summary.created.is_empty() {
            self.notify_changed(service).await;
        }
    }
}

fn is_duplicate(existing: &[(HttpMethod, String)], method: HttpMethod, endpoint: &str) -> bool {
    existing
        .iter()
        .any(|(m, pattern)| is_same_identity(*m, pattern, method, endpoint))
}

fn validate_status(status: u16) -> CoordinatorResult<()> {
    if !(100..=599).contains(&status) {
        return Err(CoordinatorError::Validation(format!(
            "invalid HTTP status code: {}",
            status
        )));
    }
    Ok(())
}

fn build_apis(
    service_id: Uuid,
    summary: String,
    method: HttpMethod,
    endpoint: String,
    source: ApisSource,
    response: Option<MockApisResponse>,
) -> MockApis {
    let now = Utc::now();
    MockApis {
        id: Uuid::new_v4(),
        mock_service_id: service_id,
        summary,
        method,
        endpoint,
        source,
        response,
        simulate_error: None,
        pushback: false,
        created_at: now,
        updated_at: now,
    }
}
