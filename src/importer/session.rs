// ==========================================
// CSV 导入核心 - 导入会话
// ==========================================
// 职责: 编排层，串起 状态构建器 / 派发器 / 持久化 / 宿主钩子
// 流程:
// 1. mount: 构建启动状态（initial_state > 持久化快照 > 初始状态）
// 2. upload_file → mapping → confirm_mappings → preview
// 3. 预览编辑: change_cell / remove_rows / add_empty_row / change_sheet
// 4. submit: PROGRESS(0) → SUBMIT → 去空行 + 转换 → 完成处理器 → PROGRESS(100) → COMPLETED
//    处理器失败或 panic → FAILED（不向调用方抛出）
// ==========================================

use crate::config::ImporterDefinition;
use crate::domain::state::{
    CellChangedPayload, ColumnMapping, ImporterAction, ImporterState, RemoveRowsPayload,
    SheetRow, UploadedFile,
};
use crate::domain::types::{AvailableAction, ImporterMode};
use crate::engine::state_builder::StateBuilder;
use crate::engine::transformer::apply_transformations;
use crate::importer::dispatcher::{ProgressReporter, StateDispatcher};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::export::export_sheet_csv;
use crate::repository::persistence::{build_state, persistence_key, PersistenceWriter};
use crate::repository::sqlite_state_store::SqliteStateStore;
use crate::repository::state_store::StateStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct ImporterSession {
    session_id: Uuid,
    definition: Arc<ImporterDefinition>,
    dispatcher: StateDispatcher,
}

impl ImporterSession {
    /// 创建会话并构建启动状态
    #[instrument(skip(definition), fields(sheets = definition.sheets.len()))]
    pub async fn mount(definition: ImporterDefinition) -> Self {
        let session_id = Uuid::new_v4();
        let definition = Arc::new(definition);
        let sheets = Arc::clone(&definition.sheets);

        let store = Self::resolve_store(&definition);

        let state = match &definition.initial_state {
            Some(initial) => ImporterState {
                sheet_definitions: Arc::clone(&sheets),
                ..initial.clone()
            },
            None => build_state(sheets, &definition.persistence_config, store.as_deref()).await,
        };

        let mut dispatcher = StateDispatcher::new(state);
        if let Some(listener) = &definition.on_state_changed {
            dispatcher = dispatcher.with_listener(Arc::clone(listener));
        }
        if let Some(store) = store {
            let key = persistence_key(&definition.persistence_config);
            dispatcher = dispatcher.with_writer(PersistenceWriter::spawn(store, key));
        }

        info!(session_id = %session_id, mode = %dispatcher.state().mode, "导入会话已创建");

        Self {
            session_id,
            definition,
            dispatcher,
        }
    }

    /// 开启持久化时确定存储: 宿主提供的存储优先，否则使用默认 SQLite 文件
    fn resolve_store(definition: &ImporterDefinition) -> Option<Arc<dyn StateStore>> {
        if !definition.persistence_config.enabled {
            return None;
        }
        if let Some(store) = &definition.state_store {
            return Some(Arc::clone(store));
        }
        match SqliteStateStore::open_default() {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "默认状态存储不可用，持久化关闭");
                None
            }
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn definition(&self) -> &ImporterDefinition {
        &self.definition
    }

    pub fn dispatcher(&self) -> &StateDispatcher {
        &self.dispatcher
    }

    /// 当前状态快照
    pub fn state(&self) -> ImporterState {
        self.dispatcher.state()
    }

    fn builder(&self) -> StateBuilder {
        StateBuilder::new(Arc::clone(&self.definition), self.dispatcher.state())
    }

    fn require(&self, action: AvailableAction) -> ImportResult<()> {
        if self.definition.is_action_available(action) {
            Ok(())
        } else {
            Err(ImportError::ActionNotAvailable(format!("{:?}", action)))
        }
    }

    // ==========================================
    // 上传与映射
    // ==========================================

    /// 上传文件；解析失败时状态保持不变
    #[instrument(skip(self, file), fields(session_id = %self.session_id, file = %file.name))]
    pub async fn upload_file(&self, file: UploadedFile) -> ImportResult<()> {
        let ticket = self.dispatcher.begin_async_work();
        let mut builder = self.builder();

        if let Err(e) = builder.upload_file(file).await {
            warn!(error = %e, "文件上传失败");
            return Err(e);
        }
        builder.dispatch_change(&self.dispatcher, ticket)
    }

    /// 跳过上传，直接手工录入
    pub fn enter_data_manually(&self, amount_of_empty_rows_to_add: Option<usize>) -> ImportResult<()> {
        if !self.definition.allow_manual_data_entry {
            return Err(ImportError::ManualEntryDisabled);
        }
        let ticket = self.dispatcher.begin_async_work();
        let mut builder = self.builder();
        builder.set_enter_data_manually(amount_of_empty_rows_to_add);
        builder.dispatch_change(&self.dispatcher, ticket)
    }

    pub fn change_mappings(&self, mappings: Vec<ColumnMapping>) {
        self.dispatcher
            .dispatch(ImporterAction::ColumnMappingChanged { mappings });
    }

    /// 确认映射并进入预览
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn confirm_mappings(&self) -> ImportResult<()> {
        let ticket = self.dispatcher.begin_async_work();
        let mut builder = self.builder();
        builder.confirm_mappings().await?;
        builder.dispatch_change(&self.dispatcher, ticket)
    }

    // ==========================================
    // 预览编辑
    // ==========================================

    pub fn change_cell(&self, sheet_id: &str, row_index: usize, value: SheetRow) {
        self.dispatcher
            .dispatch(ImporterAction::CellChanged(CellChangedPayload {
                sheet_id: sheet_id.to_string(),
                row_index,
                value,
            }));
    }

    pub fn remove_rows(&self, sheet_id: &str, row_indices: Vec<usize>) -> ImportResult<()> {
        self.require(AvailableAction::RemoveRows)?;
        self.dispatcher
            .dispatch(ImporterAction::RemoveRows(RemoveRowsPayload {
                sheet_id: sheet_id.to_string(),
                row_indices,
            }));
        Ok(())
    }

    pub fn add_empty_row(&self) -> ImportResult<()> {
        self.require(AvailableAction::AddRow)?;
        self.dispatcher.dispatch(ImporterAction::AddEmptyRow);
        Ok(())
    }

    pub fn change_sheet(&self, sheet_id: &str) {
        self.dispatcher.dispatch(ImporterAction::SheetChanged {
            sheet_id: sheet_id.to_string(),
        });
    }

    /// 在指定表中搜索，返回匹配行号（忽略大小写，匹配任一单元格的展示文本）
    pub fn search_rows(&self, sheet_id: &str, query: &str) -> ImportResult<Vec<usize>> {
        self.require(AvailableAction::Search)?;
        let needle = query.trim().to_lowercase();
        let state = self.dispatcher.state();

        let Some(sheet) = state.sheet(sheet_id) else {
            return Ok(Vec::new());
        };

        Ok(sheet
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                needle.is_empty()
                    || row
                        .values()
                        .any(|v| v.to_display_string().to_lowercase().contains(&needle))
            })
            .map(|(idx, _)| idx)
            .collect())
    }

    /// 按定义中的导出模式导出当前表
    pub fn export_current_sheet_csv(&self) -> ImportResult<String> {
        self.require(AvailableAction::DownloadCsv)?;
        let state = self.dispatcher.state();

        let (Some(definition), Some(sheet)) = (
            state.sheet_definition(&state.current_sheet_id),
            state.current_sheet(),
        ) else {
            return Err(ImportError::Other(anyhow::anyhow!(
                "当前表不存在: {}",
                state.current_sheet_id
            )));
        };

        export_sheet_csv(definition, sheet, self.definition.csv_download_mode)
    }

    // ==========================================
    // 回退与重置
    // ==========================================

    pub fn back_to_upload(&self) {
        self.dispatcher.dispatch(ImporterAction::Upload);
    }

    /// 预览 → 映射（需要已有映射）
    pub fn back_to_mapping(&self) -> ImportResult<()> {
        self.require(AvailableAction::BackToPreviousStep)?;
        if self.dispatcher.state().column_mappings.is_none() {
            return Err(ImportError::MissingParsedFile);
        }
        self.dispatcher.dispatch(ImporterAction::Mapping);
        Ok(())
    }

    /// 提交/失败/完成 → 预览
    pub fn back_to_preview(&self) {
        self.dispatcher.dispatch(ImporterAction::Preview);
    }

    pub fn reset(&self) -> ImportResult<()> {
        self.require(AvailableAction::ResetState)?;
        self.dispatcher.dispatch(ImporterAction::Reset);
        Ok(())
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 当前校验错误是否阻止提交
    pub fn is_submission_blocked(&self) -> bool {
        let state = self.dispatcher.state();
        self.definition
            .prevent_upload_on_validation_errors
            .blocks(&state.validation_errors)
    }

    /// 提交数据，返回最终模式（completed / failed）
    ///
    /// 完成处理器的失败转换为 failed 模式，不作为 Err 返回；
    /// Err 只表示提交被策略阻止或结果已过期
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn submit(&self) -> ImportResult<ImporterMode> {
        if self.is_submission_blocked() {
            warn!("存在校验错误，提交被阻止");
            return Err(ImportError::SubmissionBlocked);
        }

        let ticket = self.dispatcher.begin_async_work();
        self.dispatcher
            .dispatch_all(vec![ImporterAction::Progress { progress: 0 }, ImporterAction::Submit]);

        let state = self.dispatcher.state();
        let cleaned: Vec<_> = state.sheet_data.iter().map(|s| s.without_empty_rows()).collect();
        let final_state = ImporterState {
            sheet_data: apply_transformations(&state.sheet_definitions, &cleaned),
            ..state
        };

        info!(
            rows = final_state.sheet_data.iter().map(|s| s.rows.len()).sum::<usize>(),
            "开始提交"
        );

        // 处理器在独立任务中运行，panic 与返回错误一样转为 failed
        let progress = ProgressReporter::new(self.dispatcher.clone(), ticket);
        let handler = Arc::clone(&self.definition.on_complete);
        let outcome = match tokio::spawn(async move { handler.on_complete(final_state, progress).await })
            .await
        {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("完成处理器异常终止: {}", e)),
        };

        match outcome {
            Ok(import_statistics) => {
                let pacing = self.definition.submit_pacing;
                tokio::time::sleep(pacing.before_full_progress).await;
                if !self.dispatcher.dispatch_all_if_current(
                    ticket,
                    vec![ImporterAction::Progress { progress: 100 }],
                ) {
                    return Err(ImportError::StaleResult);
                }

                tokio::time::sleep(pacing.before_completed).await;
                if !self.dispatcher.dispatch_all_if_current(
                    ticket,
                    vec![ImporterAction::Completed { import_statistics }],
                ) {
                    return Err(ImportError::StaleResult);
                }

                info!("提交完成");
                Ok(ImporterMode::Completed)
            }
            Err(e) => {
                warn!(error = %e, "完成处理器失败");
                if !self
                    .dispatcher
                    .dispatch_all_if_current(ticket, vec![ImporterAction::Failed])
                {
                    return Err(ImportError::StaleResult);
                }
                Ok(ImporterMode::Failed)
            }
        }
    }

    /// 等待已提交的持久化写入完成
    pub async fn flush(&self) {
        if let Some(writer) = self.dispatcher.writer() {
            writer.flush().await;
        }
    }
}
