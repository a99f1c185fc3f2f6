// ==========================================
// CSV 导入核心 - 状态构建器
// ==========================================
// 职责: 把高层意图（上传、手工录入、设置映射、确认映射）展开为动作序列
// - get_state(): 在初始状态上重放动作，预演结果，不派发
// - dispatch_change(): 用同一动作序列提交到派发器（票据过期时整批丢弃）
// 红线: 不引入 reducer 之外的状态变更路径
// ==========================================

use crate::config::ImporterDefinition;
use crate::domain::state::{ColumnMapping, ImporterAction, ImporterState, UploadedFile};
use crate::engine::reducer::reduce;
use crate::importer::dispatcher::{GenerationTicket, StateDispatcher};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_loader::prepare_file;
use crate::importer::mapping_resolver::{get_mapped_data, suggest_mappings};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct StateBuilder {
    definition: Arc<ImporterDefinition>,
    initial_state: ImporterState,
    steps: Vec<ImporterAction>,
}

impl StateBuilder {
    pub fn new(definition: Arc<ImporterDefinition>, initial_state: ImporterState) -> Self {
        Self {
            definition,
            initial_state,
            steps: Vec::new(),
        }
    }

    /// 已累积的动作
    pub fn steps(&self) -> &[ImporterAction] {
        &self.steps
    }

    /// 预演: 在初始状态上依次重放全部动作
    pub fn get_state(&self) -> ImporterState {
        self.steps
            .iter()
            .cloned()
            .fold(self.initial_state.clone(), |state, action| reduce(&state, action))
    }

    /// 上传文件: 大小检查 → 加载器转换 → 解析 → 映射建议
    ///
    /// 产生 FILE_PARSED + COLUMN_MAPPING_CHANGED；任何失败都不追加动作
    #[instrument(skip(self, file), fields(file = %file.name, size = file.size_in_bytes()))]
    pub async fn upload_file(&mut self, file: UploadedFile) -> ImportResult<()> {
        let limit = self.definition.max_file_size_in_bytes;
        if file.size_in_bytes() > limit {
            return Err(ImportError::FileTooLarge {
                size: file.size_in_bytes(),
                limit,
            });
        }

        let raw_file = file.info();
        let prepared = prepare_file(file, &self.definition.custom_file_loaders).await?;
        let parsed = self.definition.parser.parse(&prepared).await?;

        let mappings = match &self.definition.custom_suggested_mapper {
            Some(mapper) => mapper
                .suggest(&self.definition.sheets, &parsed.headers)
                .await
                .map_err(|e| ImportError::CustomMapper(e.to_string()))?,
            None => suggest_mappings(&self.definition.sheets, &parsed.headers),
        };

        info!(
            headers = parsed.headers.len(),
            rows = parsed.rows.len(),
            mapped = mappings.iter().filter(|m| m.target.is_some()).count(),
            "文件上传解析完成"
        );

        self.steps.push(ImporterAction::FileParsed { parsed, raw_file });
        self.steps
            .push(ImporterAction::ColumnMappingChanged { mappings });
        Ok(())
    }

    /// 手工录入: 每张表生成 N 行空行（None 使用定义中的默认值）
    pub fn set_enter_data_manually(&mut self, amount_of_empty_rows_to_add: Option<usize>) {
        let amount = amount_of_empty_rows_to_add
            .unwrap_or(self.definition.amount_of_empty_rows_for_manual_entry);
        self.steps.push(ImporterAction::EnterDataManually {
            amount_of_empty_rows_to_add: amount,
        });
    }

    pub fn set_mappings(&mut self, mappings: Vec<ColumnMapping>) {
        self.steps
            .push(ImporterAction::ColumnMappingChanged { mappings });
    }

    /// 确认映射: 投影 → 可选的映射后钩子 → DATA_MAPPED
    #[instrument(skip(self))]
    pub async fn confirm_mappings(&mut self) -> ImportResult<()> {
        let state = self.get_state();
        let parsed = state.parsed_file.ok_or(ImportError::MissingParsedFile)?;
        let mappings = state.column_mappings.unwrap_or_default();

        let mut mapped_data = get_mapped_data(&self.definition.sheets, &mappings, &parsed);

        if let Some(hook) = &self.definition.on_data_columns_mapped {
            mapped_data = hook
                .on_data_columns_mapped(mapped_data)
                .await
                .map_err(|e| ImportError::MappingHook(e.to_string()))?;
        }

        info!(
            sheets = mapped_data.len(),
            rows = mapped_data.iter().map(|s| s.rows.len()).sum::<usize>(),
            "映射确认完成"
        );

        self.steps.push(ImporterAction::DataMapped { mapped_data });
        Ok(())
    }

    /// 提交到派发器；票据过期时丢弃并返回 StaleResult
    pub fn dispatch_change(
        self,
        dispatcher: &StateDispatcher,
        ticket: GenerationTicket,
    ) -> ImportResult<()> {
        if dispatcher.dispatch_all_if_current(ticket, self.steps) {
            Ok(())
        } else {
            Err(ImportError::StaleResult)
        }
    }
}
