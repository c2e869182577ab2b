use crate::domain::model::{
    AppliedFix, FailureRecord, FixRecord, FixStatus, FixSuggestion, RiskLevel,
};
use crate::domain::ports::{FixApplier, FixStore};
use crate::utils::error::{KintsugiError, Result};
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;
use uuid::Uuid;

/// 修正建議的審核流程：pending -> approved/rejected -> applied/apply_failed
pub struct ReviewService<F: FixStore> {
    store: F,
    auto_approve_low_risk: bool,
    // load-modify-save 需要序列化
    write_lock: Mutex<()>,
    // 正在套用中的 fix id
    applying: Mutex<HashSet<String>>,
}

impl<F: FixStore> ReviewService<F> {
    pub fn new(store: F, auto_approve_low_risk: bool) -> Self {
        Self {
            store,
            auto_approve_low_risk,
            write_lock: Mutex::new(()),
            applying: Mutex::new(HashSet::new()),
        }
    }

    pub async fn propose(
        &self,
        failure: &FailureRecord,
        suggestion: FixSuggestion,
    ) -> Result<FixRecord> {
        let _guard = self.write_lock.lock().await;
        let mut fixes = self.store.load_all().await?;

        let auto_approved = self.auto_approve_low_risk
            && suggestion.risk_level == RiskLevel::Low
            && !suggestion.file_changes.is_empty();
        let now = Utc::now();
        let fix = FixRecord {
            id: Uuid::new_v4().to_string(),
            failure_id: failure.id.clone(),
            repository: failure.repository.clone(),
            base_branch: failure.branch.clone(),
            suggestion,
            status: if auto_approved {
                FixStatus::Approved
            } else {
                FixStatus::Pending
            },
            reviewer: auto_approved.then(|| "kintsugi-auto".to_string()),
            review_comment: auto_approved.then(|| "Auto-approved: low risk".to_string()),
            pull_request_url: None,
            created_at: now,
            updated_at: now,
        };

        tracing::info!(
            "📝 Proposed fix {} for failure {} ({})",
            fix.id,
            fix.failure_id,
            fix.status
        );
        fixes.push(fix.clone());
        self.store.save_all(&fixes).await?;
        Ok(fix)
    }

    pub async fn approve(&self, fix_id: &str, reviewer: &str, comment: Option<String>) -> Result<FixRecord> {
        self.transition(fix_id, "approve", |fix| {
            match fix.status {
                FixStatus::Pending | FixStatus::ApplyFailed => {}
                _ => return false,
            }
            fix.status = FixStatus::Approved;
            fix.reviewer = Some(reviewer.to_string());
            fix.review_comment = comment;
            true
        })
        .await
    }

    pub async fn reject(&self, fix_id: &str, reviewer: &str, reason: Option<String>) -> Result<FixRecord> {
        self.transition(fix_id, "reject", |fix| {
            if fix.status != FixStatus::Pending {
                return false;
            }
            fix.status = FixStatus::Rejected;
            fix.reviewer = Some(reviewer.to_string());
            fix.review_comment = reason;
            true
        })
        .await
    }

    /// 只有 approved 的修正可以套用；失敗時記錄 apply_failed 並回傳錯誤
    pub async fn apply(&self, fix_id: &str, applier: &dyn FixApplier) -> Result<FixRecord> {
        let snapshot = {
            let _guard = self.write_lock.lock().await;
            let fixes = self.store.load_all().await?;
            let fix = &fixes[find_index(&fixes, fix_id)?];

            if fix.status != FixStatus::Approved
                || !self.applying.lock().await.insert(fix_id.to_string())
            {
                return Err(invalid_transition(fix, "apply"));
            }
            fix.clone()
        };

        // GitHub 呼叫期間不持有寫入鎖
        let outcome = applier.apply(&snapshot).await;
        let result = self.record_apply_outcome(fix_id, outcome).await;
        self.applying.lock().await.remove(fix_id);
        result
    }

    async fn record_apply_outcome(
        &self,
        fix_id: &str,
        outcome: Result<AppliedFix>,
    ) -> Result<FixRecord> {
        let _guard = self.write_lock.lock().await;
        let mut fixes = self.store.load_all().await?;
        let index = find_index(&fixes, fix_id)?;
        let fix = &mut fixes[index];
        fix.updated_at = Utc::now();

        match outcome {
            Ok(applied) => {
                fix.status = FixStatus::Applied;
                fix.pull_request_url = Some(applied.pull_request_url);
                let updated = fix.clone();
                self.store.save_all(&fixes).await?;
                tracing::info!("✅ Fix {} applied", fix_id);
                Ok(updated)
            }
            Err(e) => {
                fix.status = FixStatus::ApplyFailed;
                self.store.save_all(&fixes).await?;
                tracing::error!("❌ Applying fix {} failed: {}", fix_id, e);
                Err(e)
            }
        }
    }

    pub async fn get(&self, fix_id: &str) -> Result<FixRecord> {
        let fixes = self.store.load_all().await?;
        let index = find_index(&fixes, fix_id)?;
        Ok(fixes[index].clone())
    }

    pub async fn list(&self, status: Option<FixStatus>) -> Result<Vec<FixRecord>> {
        let fixes = self.store.load_all().await?;
        Ok(fixes
            .into_iter()
            .filter(|f| status.map_or(true, |s| f.status == s))
            .collect())
    }

    async fn transition<T>(&self, fix_id: &str, action: &str, update: T) -> Result<FixRecord>
    where
        T: FnOnce(&mut FixRecord) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut fixes = self.store.load_all().await?;
        let index = find_index(&fixes, fix_id)?;

        let fix = &mut fixes[index];
        if !update(fix) {
            return Err(invalid_transition(fix, action));
        }
        fix.updated_at = Utc::now();
        let updated = fix.clone();

        self.store.save_all(&fixes).await?;
        tracing::info!("Fix {} -> {}", fix_id, updated.status);
        Ok(updated)
    }
}

fn find_index(fixes: &[FixRecord], fix_id: &str) -> Result<usize> {
    fixes
        .iter()
        .position(|f| f.id == fix_id)
        .ok_or_else(|| KintsugiError::NotFound {
            fix_id: fix_id.to_string(),
        })
}

fn invalid_transition(fix: &FixRecord, action: &str) -> KintsugiError {
    KintsugiError::InvalidTransition {
        fix_id: fix.id.clone(),
        from: fix.status.to_string(),
        action: action.to_string(),
    }
}
