use crate::domain::model::{ErrorType, FailureRecord, FailureStatus, FixRecord, FixStatus};
use crate::utils::error::{KintsugiError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardSummary {
    pub total_failures: usize,
    pub failures_by_status: BTreeMap<String, usize>,
    pub total_fixes: usize,
    pub fixes_by_status: BTreeMap<String, usize>,
    pub by_error_type: BTreeMap<String, usize>,
    pub by_project_type: BTreeMap<String, usize>,
    pub approval_rate: f64,
    pub applied_count: usize,
    pub most_common_error_type: Option<String>,
}

fn bump(map: &mut BTreeMap<String, usize>, key: impl ToString) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

/// 儀表板用的彙總數字，只做計數，不做任何圖表組合
pub fn summarize(failures: &[FailureRecord], fixes: &[FixRecord]) -> DashboardSummary {
    let mut summary = DashboardSummary {
        total_failures: failures.len(),
        total_fixes: fixes.len(),
        ..Default::default()
    };

    for failure in failures {
        bump(&mut summary.failures_by_status, failure.status);
    }

    let mut reviewed = 0usize;
    let mut accepted = 0usize;
    for fix in fixes {
        bump(&mut summary.fixes_by_status, fix.status);
        bump(&mut summary.by_error_type, fix.suggestion.error_type);
        bump(&mut summary.by_project_type, fix.suggestion.project_type);

        match fix.status {
            FixStatus::Pending => {}
            FixStatus::Rejected => reviewed += 1,
            FixStatus::Approved | FixStatus::Applied | FixStatus::ApplyFailed => {
                reviewed += 1;
                accepted += 1;
            }
        }
        if fix.status == FixStatus::Applied {
            summary.applied_count += 1;
        }
    }

    summary.approval_rate = if reviewed == 0 {
        0.0
    } else {
        accepted as f64 / reviewed as f64
    };
    summary.most_common_error_type = most_common_error_type(fixes).map(|(t, _)| t.to_string());
    summary
}

/// 依失敗狀態更新：有修正建議的失敗標記為 fix_suggested，已套用的標記為 resolved
pub fn reconcile_failure_status(failure: &mut FailureRecord, fixes: &[FixRecord]) {
    let related = fixes.iter().filter(|f| f.failure_id == failure.id);
    let mut has_fix = false;
    for fix in related {
        has_fix = true;
        if fix.status == FixStatus::Applied {
            failure.status = FailureStatus::Resolved;
            return;
        }
    }
    if has_fix && failure.status == FailureStatus::New {
        failure.status = FailureStatus::FixSuggested;
    }
}

pub fn most_common_error_type(fixes: &[FixRecord]) -> Option<(ErrorType, usize)> {
    let mut counts: BTreeMap<String, (ErrorType, usize)> = BTreeMap::new();
    for fix in fixes {
        let entry = counts
            .entry(fix.suggestion.error_type.to_string())
            .or_insert((fix.suggestion.error_type, 0));
        entry.1 += 1;
    }
    counts
        .into_values()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.to_string().cmp(&a.0.to_string())))
}

/// 把修正紀錄匯出成 CSV 表格
pub fn export_fixes_csv(fixes: &[FixRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "failure_id",
        "repository",
        "base_branch",
        "status",
        "error_type",
        "project_type",
        "severity",
        "risk_level",
        "confidence",
        "source",
        "reviewer",
        "pull_request_url",
        "created_at",
    ])?;

    for fix in fixes {
        let s = &fix.suggestion;
        writer.write_record(&[
            fix.id.clone(),
            fix.failure_id.clone(),
            fix.repository.clone(),
            fix.base_branch.clone(),
            fix.status.to_string(),
            s.error_type.to_string(),
            s.project_type.to_string(),
            s.severity.to_string(),
            s.risk_level.to_string(),
            format!("{:.2}", s.confidence),
            s.source.to_string(),
            fix.reviewer.clone().unwrap_or_default(),
            fix.pull_request_url.clone().unwrap_or_default(),
            fix.created_at.to_rfc3339(),
        ])?;
    }

    let data = writer
        .into_inner()
        .map_err(|e| KintsugiError::IoError(e.into_error()))?;
    String::from_utf8(data).map_err(|e| KintsugiError::validation(e.to_string()))
}
