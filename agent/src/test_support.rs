//! テスト用のフィクスチャと偽コントロールプレーン

use async_trait::async_trait;
use chrono::Utc;
use mockhub_common::{
    error::{AgentError, AgentResult},
    protocol::{ApisDetailQuery, CounterSnapshot},
    types::{
        ApisSource, HttpMethod, MockApis, MockApisResponse, MockService, MockServiceSetting,
        MockServiceStatus,
    },
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::client::ControlPlaneClient;

pub(crate) fn service(port: u16) -> MockService {
    let now = Utc::now();
    MockService {
        id: Uuid::new_v4(),
        project_id: Uuid::nil(),
        name: format!("svc-{}", port),
        node_id: Uuid::new_v4(),
        service_port: port,
        service_domain: None,
        auth_enabled: false,
        auth_keys: Vec::new(),
        status: MockServiceStatus::Running,
        setting: MockServiceSetting::default(),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn apis(service_id: Uuid, method: HttpMethod, endpoint: &str) -> MockApis {
    let now = Utc::now();
    MockApis {
        id: Uuid::new_v4(),
        mock_service_id: service_id,
        summary: String::new(),
        method,
        endpoint: endpoint.to_string(),
        source: ApisSource::Created,
        response: Some(MockApisResponse {
            status: 200,
            headers: Default::default(),
            body: format!("{} {}", method, endpoint),
            delay_ms: 0,
        }),
        simulate_error: None,
        pushback: false,
        created_at: now,
        updated_at: now,
    }
}

/// 呼び出しを記録する偽コントロールプレーン
#[derive(Debug)]
pub(crate) struct FakeControlPlane {
    pub service: Mutex<MockService>,
    pub apis: Mutex<Vec<MockApis>>,
    pub uploads: Mutex<Vec<CounterSnapshot>>,
    pub failing_uploads: AtomicUsize,
}

impl FakeControlPlane {
    pub(crate) fn new(service: MockService, apis: Vec<MockApis>) -> Self {
        Self {
            service: Mutex::new(service),
            apis: Mutex::new(apis),
            uploads: Mutex::new(Vec::new()),
            failing_uploads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_next_uploads(&self, count: usize) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    pub(crate) fn uploads(&self) -> Vec<CounterSnapshot> {
        self.uploads.lock().unwrap().clone()
    }

    pub(crate) fn uploaded_total(&self) -> CounterSnapshot {
        let mut total = CounterSnapshot::default();
        for upload in self.uploads() {
            total.merge(&upload);
        }
        total
    }
}

#[async_trait]
impl ControlPlaneClient for FakeControlPlane {
    async fn get_service_detail(&self, _service_id: Uuid) -> AgentResult<MockService> {
        Ok(self.service.lock().unwrap().clone())
    }

    async fn get_apis_detail(
        &self,
        _service_id: Uuid,
        _query: &ApisDetailQuery,
    ) -> AgentResult<Vec<MockApis>> {
        Ok(self.apis.lock().unwrap().clone())
    }

    async fn upload_counters(
        &self,
        _service_id: Uuid,
        snapshot: &CounterSnapshot,
    ) -> AgentResult<()> {
        let remaining = self.failing_uploads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_uploads.store(remaining - 1, Ordering::SeqCst);
            return Err(AgentError::SyncUpload("control plane unavailable".to_string()));
        }
        self.uploads.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}
