// ==========================================
// CSV 导入核心 - 状态派发器
// ==========================================
// 职责:
// - 持有唯一的 ImporterState，按派发顺序依次经 reducer 整体替换
// - 代际（generation）票据: 异步意图开始时领取，UPLOAD / RESET / SET_STATE
//   以及更新的异步意图都会让旧票据失效，过期结果被丢弃
// - 每批派发后提交持久化（锁内入队，保证快照顺序与状态变化一致）
//   并通知监听器（锁外执行，监听器可以再次读取状态）
// ==========================================

use crate::config::hooks::StateChangeListener;
use crate::domain::state::{ImporterAction, ImporterState};
use crate::engine::reducer::reduce;
use crate::repository::persistence::PersistenceWriter;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// 异步意图的代际票据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationTicket(u64);

struct DispatcherInner {
    state: ImporterState,
    generation: u64,
}

// ==========================================
// StateDispatcher
// ==========================================
/// 可克隆；所有克隆共享同一份状态
#[derive(Clone)]
pub struct StateDispatcher {
    inner: Arc<Mutex<DispatcherInner>>,
    listener: Option<Arc<dyn StateChangeListener>>,
    writer: Option<PersistenceWriter>,
}

impl StateDispatcher {
    pub fn new(state: ImporterState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DispatcherInner {
                state,
                generation: 0,
            })),
            listener: None,
            writer: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn StateChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_writer(mut self, writer: PersistenceWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn writer(&self) -> Option<&PersistenceWriter> {
        self.writer.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, DispatcherInner> {
        // 状态只整体替换，锁中毒时内部数据仍完整
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 当前状态快照
    pub fn state(&self) -> ImporterState {
        self.lock().state.clone()
    }

    /// 开始一个异步意图: 让此前的票据全部失效并返回新票据
    pub fn begin_async_work(&self) -> GenerationTicket {
        let mut inner = self.lock();
        inner.generation += 1;
        GenerationTicket(inner.generation)
    }

    pub fn is_current(&self, ticket: GenerationTicket) -> bool {
        self.lock().generation == ticket.0
    }

    pub fn dispatch(&self, action: ImporterAction) {
        self.apply(None, vec![action]);
    }

    /// 依次派发一批动作（整批只通知一次）
    pub fn dispatch_all(&self, actions: Vec<ImporterAction>) {
        self.apply(None, actions);
    }

    /// 票据仍有效时才派发；过期返回 false
    pub fn dispatch_all_if_current(
        &self,
        ticket: GenerationTicket,
        actions: Vec<ImporterAction>,
    ) -> bool {
        self.apply(Some(ticket), actions)
    }

    fn apply(&self, ticket: Option<GenerationTicket>, actions: Vec<ImporterAction>) -> bool {
        if actions.is_empty() {
            return true;
        }

        let (previous, next) = {
            let mut inner = self.lock();
            if let Some(ticket) = ticket {
                if inner.generation != ticket.0 {
                    warn!(
                        ticket = ticket.0,
                        generation = inner.generation,
                        actions = ?actions.iter().map(ImporterAction::name).collect::<Vec<_>>(),
                        "异步结果已过期，丢弃"
                    );
                    return false;
                }
            }

            let previous = inner.state.clone();
            for action in actions {
                if action.invalidates_pending_work() {
                    inner.generation += 1;
                }
                debug!(action = action.name(), "dispatch");
                inner.state = reduce(&inner.state, action);
            }
            // 入队不阻塞，只克隆快照
            if let Some(writer) = &self.writer {
                writer.save(&inner.state);
            }
            (previous, inner.state.clone())
        };

        if let Some(listener) = &self.listener {
            listener.on_state_changed(&previous, &next);
        }
        true
    }
}

// ==========================================
// ProgressReporter - 提交进度回调
// ==========================================
/// 交给完成处理器的进度回调；提交被 RESET 等打断后上报无效
#[derive(Clone)]
pub struct ProgressReporter {
    dispatcher: StateDispatcher,
    ticket: GenerationTicket,
}

impl ProgressReporter {
    pub fn new(dispatcher: StateDispatcher, ticket: GenerationTicket) -> Self {
        Self { dispatcher, ticket }
    }

    /// 上报进度（超过 100 按 100 处理）
    pub fn report(&self, progress: u8) -> bool {
        self.dispatcher.dispatch_all_if_current(
            self.ticket,
            vec![ImporterAction::Progress {
                progress: progress.min(100),
            }],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sheet::SheetDefinition;
    use crate::domain::types::ImporterMode;
    use crate::engine::reducer::build_initial_state;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher() -> StateDispatcher {
        StateDispatcher::new(build_initial_state(Arc::new(vec![SheetDefinition::new(
            "people", "People",
        )])))
    }

    #[test]
    fn test_dispatch_in_order() {
        let d = dispatcher();
        d.dispatch_all(vec![ImporterAction::Mapping, ImporterAction::Preview]);
        assert_eq!(d.state().mode, ImporterMode::Preview);
    }

    #[test]
    fn test_stale_ticket_is_dropped() {
        let d = dispatcher();
        let old = d.begin_async_work();
        d.dispatch(ImporterAction::Reset);

        assert!(!d.dispatch_all_if_current(old, vec![ImporterAction::Mapping]));
        assert_eq!(d.state().mode, ImporterMode::Upload);
    }

    #[test]
    fn test_newer_intent_invalidates_older() {
        let d = dispatcher();
        let first = d.begin_async_work();
        let second = d.begin_async_work();

        assert!(!d.is_current(first));
        assert!(d.dispatch_all_if_current(second, vec![ImporterAction::Mapping]));
        assert_eq!(d.state().mode, ImporterMode::Mapping);
    }

    #[test]
    fn test_listener_fires_once_per_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let d = dispatcher().with_listener(Arc::new(
            move |prev: &ImporterState, next: &ImporterState| {
                assert_eq!(prev.mode, ImporterMode::Upload);
                assert_eq!(next.mode, ImporterMode::Preview);
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        d.dispatch_all(vec![ImporterAction::Mapping, ImporterAction::Preview]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_persists_final_state() {
        use crate::repository::memory_state_store::MemoryStateStore;
        use crate::repository::state_store::StateStore;

        let store = Arc::new(MemoryStateStore::new());
        let d = StateDispatcher::new(build_initial_state(Arc::new(vec![SheetDefinition::new(
            "people", "People",
        )])))
        .with_writer(PersistenceWriter::spawn(store.clone(), "k"));
        d.dispatch(ImporterAction::EnterDataManually {
            amount_of_empty_rows_to_add: 0,
        });

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let d = d.clone();
                scope.spawn(move || {
                    for _ in 0..25 {
                        d.dispatch(ImporterAction::AddEmptyRow);
                    }
                });
            }
        });

        d.writer().unwrap().flush().await;
        let saved = store.get("k").await.unwrap().unwrap();
        assert_eq!(d.state().sheet_data[0].rows.len(), 200);
        assert_eq!(saved.sheet_data, d.state().sheet_data);
    }

    #[test]
    fn test_progress_reporter_respects_ticket() {
        let d = dispatcher();
        let reporter = ProgressReporter::new(d.clone(), d.begin_async_work());

        assert!(reporter.report(150));
        assert_eq!(d.state().import_progress, 100);

        d.dispatch(ImporterAction::Reset);
        assert!(!reporter.report(10));
        assert_eq!(d.state().import_progress, 0);
    }
}
