// ==========================================
// 评审分配引擎 - 减负（reduced load）→ 成员容量覆写
// ==========================================
// 红线: 已有覆写只能降低，不能提高
// ==========================================

use crate::domain::capacity::CapacityOverride;
use crate::domain::configuration::parse_int_string;
use crate::domain::member::Profile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 招募回复（按提交时间升序给出，同一用户以最后一次为准）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecruitmentResponse {
    /// 回复人（邮箱或档案ID）
    pub user: String,
    #[serde(default)]
    pub reduced_load: Option<String>,
}

/// 覆写变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LoadChange {
    Created { profile_id: String, max_papers: u32 },
    Lowered { profile_id: String, from: u32, to: u32 },
}

/// 把减负回复合并进容量覆写表
///
/// # 参数
/// - responses: 招募回复
/// - profiles: 匹配组成员档案（按档案ID与全部邮箱匹配）
/// - overrides: 档案ID → 现有覆写（原地更新）
///
/// # 返回
/// - 发生的变更列表
pub fn apply_reduced_loads(
    responses: &[RecruitmentResponse],
    profiles: &[Profile],
    overrides: &mut HashMap<String, CapacityOverride>,
) -> Vec<LoadChange> {
    let mut loads: HashMap<&str, u32> = HashMap::new();
    for r in responses {
        let Some(raw) = r.reduced_load.as_deref() else {
            continue;
        };
        match parse_int_string("reduced_load", raw) {
            Ok(n) => {
                loads.insert(r.user.as_str(), n);
            }
            Err(e) => tracing::warn!(user = %r.user, error = %e, "减负值无效，忽略"),
        }
    }
    tracing::info!(responses = loads.len(), "收到减负回复");

    let mut changes = Vec::new();
    for profile in profiles {
        let Some(load) = profile.identifiers().find_map(|id| loads.get(id).copied()) else {
            continue;
        };

        match overrides.get_mut(&profile.id) {
            Some(existing) => {
                let before = existing.max_papers;
                if existing.lower_max(load) {
                    if let Some(from) = before {
                        changes.push(LoadChange::Lowered {
                            profile_id: profile.id.clone(),
                            from,
                            to: load,
                        });
                    } else {
                        changes.push(LoadChange::Created {
                            profile_id: profile.id.clone(),
                            max_papers: load,
                        });
                    }
                }
            }
            None => {
                overrides.insert(profile.id.clone(), CapacityOverride::max_only(load));
                changes.push(LoadChange::Created {
                    profile_id: profile.id.clone(),
                    max_papers: load,
                });
            }
        }
    }
    changes
}
