// ==========================================
// CSV 导入核心 - 映射解析器
// ==========================================
// 职责:
// - 表头 → 目标列 的映射建议（纯函数、确定性）
// - 按映射把解析结果投影为各表的行
// 红线: 映射引用不存在的表头时填空值，绝不报错
// ==========================================

use crate::domain::sheet::SheetDefinition;
use crate::domain::state::{
    ColumnMapping, MappingTarget, ParsedFile, SheetRow, SheetState,
};
use crate::domain::types::CellValue;
use crate::engine::column_type::recalculate_row;
use crate::perf::PerfGuard;
use std::collections::{HashMap, HashSet};

/// 归一化: 小写 + 去掉空白、下划线、连字符
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// 映射建议
///
/// - 每个表头恰好产生一条映射（匹配不到则为未映射）
/// - 按表头顺序匹配，先表 id 后列声明顺序；同一目标列只分配一次
/// - 计算列不参与映射
pub fn suggest_mappings(sheets: &[SheetDefinition], headers: &[String]) -> Vec<ColumnMapping> {
    let mut used: HashSet<MappingTarget> = HashSet::new();

    headers
        .iter()
        .map(|header| {
            let wanted = normalize_header(header);
            if wanted.is_empty() {
                return ColumnMapping::unmapped(header.clone());
            }

            let target = sheets.iter().find_map(|sheet| {
                sheet
                    .columns
                    .iter()
                    .filter(|c| !c.column_type.is_calculated())
                    .find(|c| {
                        let candidate = MappingTarget {
                            sheet_id: sheet.id.clone(),
                            sheet_column_id: c.id.clone(),
                        };
                        !used.contains(&candidate)
                            && (normalize_header(&c.id) == wanted
                                || normalize_header(&c.label) == wanted)
                    })
                    .map(|c| MappingTarget {
                        sheet_id: sheet.id.clone(),
                        sheet_column_id: c.id.clone(),
                    })
            });

            match target {
                Some(target) => {
                    used.insert(target.clone());
                    ColumnMapping {
                        csv_column_name: header.clone(),
                        target: Some(target),
                    }
                }
                None => ColumnMapping::unmapped(header.clone()),
            }
        })
        .collect()
}

/// 按映射投影解析结果
///
/// 每张表对解析文件的每一行产生一行，只包含声明过的列；
/// 未映射列为空值，计算列按行内容求值
pub fn get_mapped_data(
    sheets: &[SheetDefinition],
    mappings: &[ColumnMapping],
    parsed: &ParsedFile,
) -> Vec<SheetState> {
    let mut perf = PerfGuard::new("get_mapped_data");

    // (sheet_id, column_id) → 表头
    let sources: HashMap<(&str, &str), &str> = mappings
        .iter()
        .filter_map(|m| {
            m.target.as_ref().map(|t| {
                (
                    (t.sheet_id.as_str(), t.sheet_column_id.as_str()),
                    m.csv_column_name.as_str(),
                )
            })
        })
        .collect();

    let result: Vec<SheetState> = sheets
        .iter()
        .map(|sheet| {
            let rows = parsed
                .rows
                .iter()
                .map(|source_row| {
                    let row: SheetRow = sheet
                        .columns
                        .iter()
                        .filter(|c| !c.column_type.is_calculated())
                        .map(|column| {
                            let value = sources
                                .get(&(sheet.id.as_str(), column.id.as_str()))
                                .and_then(|header| source_row.get(*header))
                                .map(|raw| CellValue::text(raw.as_str()))
                                .unwrap_or(CellValue::Empty);
                            (column.id.clone(), value)
                        })
                        .collect();
                    recalculate_row(sheet, &row)
                })
                .collect();
            SheetState::new(sheet.id.clone(), rows)
        })
        .collect();

    perf.add_rows(result.iter().map(|s| s.rows.len()).sum());
    result
}
