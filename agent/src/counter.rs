//! エンドポイント単位のリクエストカウンター
//!
//! モックサービスの実行時インスタンスが所有する。リクエスト処理スレッドから並行に
//! インクリメントされ、スナップショットとリセットは単一の [`CounterFlusher`] だけが行う。
//!
//! ホットパス上の表現（アトミック）とワイヤ表現（[`ApisCounter`]）は別の型で、
//! 変換はスナップショット時にのみ行う。

use dashmap::DashMap;
use mockhub_common::protocol::{ApisCounter, CounterSnapshot};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// カウンターの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// 受信リクエスト
    Request,
    /// プッシュバック
    Pushback,
    /// 擬似エラー応答
    SimulateError,
    /// 正常応答
    Success,
    /// 例外
    Exception,
}

#[derive(Debug, Default)]
struct ApisCounterCell {
    request: AtomicU64,
    pushback: AtomicU64,
    simulate_error: AtomicU64,
    success: AtomicU64,
    exception: AtomicU64,
}

impl ApisCounterCell {
    fn slot(&self, kind: CounterKind) -> &AtomicU64 {
        match kind {
            CounterKind::Request => &self.request,
            CounterKind::Pushback => &self.pushback,
            CounterKind::SimulateError => &self.simulate_error,
            CounterKind::Success => &self.success,
            CounterKind::Exception => &self.exception,
        }
    }

    fn add(&self, kind: CounterKind, delta: u64) {
        self.slot(kind).fetch_add(delta, Ordering::Relaxed);
    }

    fn load(&self) -> ApisCounter {
        ApisCounter {
            request: self.request.load(Ordering::Relaxed),
            pushback: self.pushback.load(Ordering::Relaxed),
            simulate_error: self.simulate_error.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            exception: self.exception.load(Ordering::Relaxed),
        }
    }

    fn subtract(&self, uploaded: &ApisCounter) {
        for (slot, value) in [
            (&self.request, uploaded.request),
            (&self.pushback, uploaded.pushback),
            (&self.simulate_error, uploaded.simulate_error),
            (&self.success, uploaded.success),
            (&self.exception, uploaded.exception),
        ] {
            if value == 0 {
                continue;
            }
            // クロージャは常にSomeを返すため失敗しない
            let _ = slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(value))
            });
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    cells: DashMap<Uuid, ApisCounterCell>,
    flusher_taken: AtomicBool,
}

/// カウンターレジストリ（クローンは同じカウンターを共有する）
#[derive(Debug, Clone, Default)]
pub struct CounterRegistry {
    inner: Arc<Inner>,
}

impl CounterRegistry {
    /// 空のレジストリを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// カウンターを作成（既にあれば何もしない）
    pub fn init_counter(&self, apis_id: Uuid) {
        self.inner.cells.entry(apis_id).or_default();
    }

    /// 指定種別を加算（カウンターがなければ作成する）
    pub fn increment(&self, apis_id: Uuid, kind: CounterKind, delta: u64) {
        if delta == 0 {
            return;
        }
        match self.inner.cells.get(&apis_id) {
            Some(cell) => cell.add(kind, delta),
            None => self.inner.cells.entry(apis_id).or_default().add(kind, delta),
        }
    }

    /// 受信リクエスト数を加算
    pub fn increment_request(&self, apis_id: Uuid, delta: u64) {
        self.increment(apis_id, CounterKind::Request, delta);
    }

    /// プッシュバック数を加算
    pub fn increment_pushback(&self, apis_id: Uuid, delta: u64) {
        self.increment(apis_id, CounterKind::Pushback, delta);
    }

    /// 擬似エラー応答数を加算
    pub fn increment_simulate_error(&self, apis_id: Uuid, delta: u64) {
        self.increment(apis_id, CounterKind::SimulateError, delta);
    }

    /// 正常応答数を加算
    pub fn increment_success(&self, apis_id: Uuid, delta: u64) {
        self.increment(apis_id, CounterKind::Success, delta);
    }

    /// 例外数を加算
    pub fn increment_exception(&self, apis_id: Uuid, delta: u64) {
        self.increment(apis_id, CounterKind::Exception, delta);
    }

    /// カウンターを削除
    pub fn delete_counter(&self, apis_id: Uuid) -> bool {
        self.inner.cells.remove(&apis_id).is_some()
    }

    /// カウンターが存在するか
    pub fn contains(&self, apis_id: Uuid) -> bool {
        self.inner.cells.contains_key(&apis_id)
    }

    /// 保持しているカウンター数
    pub fn len(&self) -> usize {
        self.inner.cells.len()
    }

    /// カウンターが1つもないか
    pub fn is_empty(&self) -> bool {
        self.inner.cells.is_empty()
    }

    /// 非ゼロのカウンターだけを含むスナップショット
    ///
    /// インクリメントをブロックしない。
    pub fn snapshot(&self) -> CounterSnapshot {
        let map: BTreeMap<Uuid, ApisCounter> = self
            .inner
            .cells
            .iter()
            .filter_map(|entry| {
                let counter = entry.value().load();
                (!counter.is_zero()).then_some((*entry.key(), counter))
            })
            .collect();
        CounterSnapshot(map)
    }

    /// スナップショット・リセット用のハンドルを取得する
    ///
    /// レジストリごとに1回だけ取得できる。2回目以降は `None`。
    pub fn flusher(&self) -> Option<CounterFlusher> {
        if self.inner.flusher_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(CounterFlusher {
            registry: self.clone(),
        })
    }
}

/// スナップショットとリセットを行う唯一のハンドル
///
/// `reset_all` は `&mut self` を取るため、同じレジストリに対するリセットが並行することはない。
#[derive(Debug)]
pub struct CounterFlusher {
    registry: CounterRegistry,
}

impl CounterFlusher {
    /// 現在のスナップショット
    pub fn snapshot(&self) -> CounterSnapshot {
        self.registry.snapshot()
    }

    /// アップロード済みの値をゼロに戻す（resetAll）
    ///
    /// 全カウンターを一律にゼロにするのではなく、`uploaded` の値だけを差し引く。
    /// アップロード中に加算された分は残るため、「reset_all の直後の snapshot は空」が成り立つのは
    /// スナップショット取得から reset_all までに並行する加算がない場合に限られる。
    pub fn reset_all(&mut self, uploaded: &CounterSnapshot) {
        for (apis_id, counter) in uploaded.iter() {
            if let Some(cell) = self.registry.inner.cells.get(apis_id) {
                cell.subtract(counter);
            }
        }
    }

    /// 対象レジストリ
    pub fn registry(&self) -> &CounterRegistry {
        &self.registry
    }
}
