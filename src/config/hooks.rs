// ==========================================
// CSV 导入核心 - 宿主钩子 Trait
// ==========================================
// 职责: 定义宿主注入的回调接口（不包含实现）
// 红线: 钩子失败通过 anyhow::Result 返回，由编排层转换，不得 panic
// ==========================================

use crate::domain::sheet::SheetDefinition;
use crate::domain::state::{ColumnMapping, ImportStatistics, ImporterState, SheetState};
use crate::importer::dispatcher::ProgressReporter;
use async_trait::async_trait;
use std::future::Future;

// ==========================================
// CompletionHandler - 提交处理
// ==========================================
// 用途: 接收最终状态，把数据交给宿主系统
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// # 参数
    /// - state: 已去除空行并完成转换的最终状态
    /// - progress: 进度回调（0..=100）
    ///
    /// # 返回
    /// - Ok(Some(stats)): 成功，附带导入统计
    /// - Ok(None): 成功，无统计
    /// - Err: 失败（导入器进入 failed 模式）
    async fn on_complete(
        &self,
        state: ImporterState,
        progress: ProgressReporter,
    ) -> anyhow::Result<Option<ImportStatistics>>;
}

/// 闭包适配器: `CompletionFn::new(|state, progress| async move { ... })`
pub struct CompletionFn<F>(F);

impl<F> CompletionFn<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(ImporterState, ProgressReporter) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<Option<ImportStatistics>>> + Send + 'static,
    {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> CompletionHandler for CompletionFn<F>
where
    F: Fn(ImporterState, ProgressReporter) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<ImportStatistics>>> + Send + 'static,
{
    async fn on_complete(
        &self,
        state: ImporterState,
        progress: ProgressReporter,
    ) -> anyhow::Result<Option<ImportStatistics>> {
        (self.0)(state, progress).await
    }
}

// ==========================================
// DataColumnsMappedHook - 映射后处理
// ==========================================
#[async_trait]
pub trait DataColumnsMappedHook: Send + Sync {
    /// 在投影完成、进入预览前改写数据
    async fn on_data_columns_mapped(&self, data: Vec<SheetState>)
        -> anyhow::Result<Vec<SheetState>>;
}

// ==========================================
// SuggestedMapper - 自定义映射建议
// ==========================================
#[async_trait]
pub trait SuggestedMapper: Send + Sync {
    /// 替代内置的表头匹配
    async fn suggest(
        &self,
        sheets: &[SheetDefinition],
        headers: &[String],
    ) -> anyhow::Result<Vec<ColumnMapping>>;
}

// ==========================================
// StateChangeListener - 状态变化通知
// ==========================================
/// 每批派发触发一次，参数为 (变化前, 变化后)
pub trait StateChangeListener: Send + Sync {
    fn on_state_changed(&self, previous: &ImporterState, next: &ImporterState);
}

impl<F> StateChangeListener for F
where
    F: Fn(&ImporterState, &ImporterState) + Send + Sync,
{
    fn on_state_changed(&self, previous: &ImporterState, next: &ImporterState) {
        self(previous, next)
    }
}
