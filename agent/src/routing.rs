//! ルーティングテーブル
//!
//! サービス設定とエンドポイントマッチャーの組を `ArcSwap` で保持する。
//! 更新は常に新しいテーブルへの参照の差し替えで行い、処理中のリクエストは
//! 取得した時点のテーブルを最後まで使う。

use arc_swap::ArcSwap;
use mockhub_common::matcher::EndpointMatcher;
use mockhub_common::types::{MockApis, MockService};
use std::sync::Arc;

/// ある時点のルーティングテーブル（不変）
#[derive(Debug, Clone)]
pub struct RoutingTable {
    service: Arc<MockService>,
    matcher: Arc<EndpointMatcher>,
    version: u64,
}

impl RoutingTable {
    /// サービス設定
    pub fn service(&self) -> &MockService {
        &self.service
    }

    /// エンドポイントマッチャー
    pub fn matcher(&self) -> &EndpointMatcher {
        &self.matcher
    }

    /// 差し替えのたびに増える版数
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// 共有ルーティングテーブル
#[derive(Debug, Clone)]
pub struct SharedRoutingTable {
    inner: Arc<ArcSwap<RoutingTable>>,
}

impl SharedRoutingTable {
    /// 初期テーブルを作成
    pub fn new(service: MockService, apis: Vec<MockApis>) -> Self {
        let table = RoutingTable {
            service: Arc::new(service),
            matcher: Arc::new(EndpointMatcher::new(apis)),
            version: 0,
        };
        Self {
            inner: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// 現在のテーブル
    pub fn load(&self) -> Arc<RoutingTable> {
        self.inner.load_full()
    }

    /// エンドポイント定義を差し替える
    pub fn replace_apis(&self, apis: Vec<MockApis>) {
        let matcher = Arc::new(EndpointMatcher::new(apis));
        self.inner.rcu(|current| RoutingTable {
            service: current.service.clone(),
            matcher: matcher.clone(),
            version: current.version + 1,
        });
    }

    /// サービス設定を差し替える
    pub fn replace_service(&self, service: MockService) {
        let service = Arc::new(service);
        self.inner.rcu(|current| RoutingTable {
            service: service.clone(),
            matcher: current.matcher.clone(),
            version: current.version + 1,
        });
    }
}
