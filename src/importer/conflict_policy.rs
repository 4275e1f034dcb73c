// ==========================================
// 评审分配引擎 - 冲突策略
// ==========================================
// 职责: 由档案信息（机构域名、邮箱、关系、论文）计算冲突边
// 红线: 冲突边 weight = -1，标签 Conflict
// 策略: Default（全部历史）/ Recent（回溯 n 年）
// ==========================================

use crate::config::settings::EngineSettings;
use crate::domain::edge::ConflictEdge;
use crate::domain::member::Profile;
use crate::domain::paper::Paper;
use crate::importer::error::{ImportError, ImportResult};
use chrono::Datelike;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::instrument;

/// 公共二级后缀（不能单独作为机构域名）
const PUBLIC_SUFFIXES: [&str; 12] = [
    "ac.uk", "co.uk", "org.uk", "edu.cn", "com.cn", "ac.cn", "ac.jp", "co.jp", "edu.au", "com.au",
    "ac.kr", "co.kr",
];

/// 参与"近期"判定的关系类型
const RECENT_RELATIONS: [&str; 2] = ["Coauthor", "Coworker"];

/// 由邮箱或域名生成全部上级域名
///
/// `someone@iesl.cs.umass.edu` → `[iesl.cs.umass.edu, cs.umass.edu, umass.edu]`
pub fn subdomains(domain_or_email: &str) -> Vec<String> {
    let full = match domain_or_email.split_once('@') {
        Some((_, d)) => d,
        None => domain_or_email,
    };
    let components: Vec<String> = full
        .split('.')
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    (0..components.len())
        .map(|i| components[i..].join("."))
        .filter(|d| d.contains('.') && !PUBLIC_SUFFIXES.contains(&d.as_str()))
        .collect()
}

// ==========================================
// ProfileInfo - 冲突计算用的档案摘要
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ProfileInfo {
    pub id: String,
    pub domains: HashSet<String>,
    pub emails: HashSet<String>,
    pub relations: HashSet<String>,
    pub publications: HashSet<String>,
}

impl ProfileInfo {
    fn merge(&mut self, other: ProfileInfo) {
        self.domains.extend(other.domains);
        self.emails.extend(other.emails);
        self.relations.extend(other.relations);
        self.publications.extend(other.publications);
    }

    /// 两份档案摘要之间的冲突项
    pub fn conflicts_with(&self, user: &ProfileInfo, include_publications: bool) -> BTreeSet<String> {
        let mut conflicts = BTreeSet::new();
        conflicts.extend(self.domains.intersection(&user.domains).cloned());
        conflicts.extend(self.relations.intersection(&user.emails).cloned());
        conflicts.extend(self.emails.intersection(&user.relations).cloned());
        conflicts.extend(self.emails.intersection(&user.emails).cloned());
        if include_publications {
            conflicts.extend(self.publications.intersection(&user.publications).cloned());
        }
        conflicts
    }
}

// ==========================================
// Trait: ConflictPolicy
// ==========================================
pub trait ConflictPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 提取档案摘要（已剔除常见邮箱域名）
    fn profile_info(&self, profile: &Profile, common_domains: &HashSet<String>) -> ImportResult<ProfileInfo>;
}

fn checked_emails(profile: &Profile) -> ImportResult<HashSet<String>> {
    let mut emails = HashSet::new();
    for email in &profile.emails {
        if email.starts_with("****@") {
            return Err(ImportError::ObfuscatedEmail(profile.id.clone()));
        }
        emails.insert(email.to_lowercase());
    }
    Ok(emails)
}

/// 默认策略：全部任职、全部关系、全部论文
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConflictPolicy;

impl ConflictPolicy for DefaultConflictPolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn profile_info(&self, profile: &Profile, common_domains: &HashSet<String>) -> ImportResult<ProfileInfo> {
        let emails = checked_emails(profile)?;
        let mut domains: HashSet<String> = emails.iter().flat_map(|e| subdomains(e)).collect();
        for h in &profile.history {
            domains.extend(subdomains(&h.institution_domain));
        }
        domains.retain(|d| !common_domains.contains(d));

        Ok(ProfileInfo {
            id: profile.id.clone(),
            domains,
            emails,
            relations: profile.relations.iter().map(|r| r.email.to_lowercase()).collect(),
            publications: profile.publications.iter().map(|p| p.id.clone()).collect(),
        })
    }
}

/// 近期策略：仅回溯 n 年内的任职、合作关系与论文
#[derive(Debug, Clone, Copy)]
pub struct RecentConflictPolicy {
    pub lookback_years: i32,
    pub current_year: i32,
}

impl RecentConflictPolicy {
    pub fn new(lookback_years: i32) -> Self {
        Self {
            lookback_years,
            current_year: chrono::Utc::now().year(),
        }
    }

    pub fn cut_off_year(&self) -> i32 {
        self.current_year - self.lookback_years - 1
    }

    fn is_recent(&self, end_year: Option<i32>) -> bool {
        end_year.map(|y| y > self.cut_off_year()).unwrap_or(true)
    }
}

impl ConflictPolicy for RecentConflictPolicy {
    fn name(&self) -> &'static str {
        "recent"
    }

    fn profile_info(&self, profile: &Profile, common_domains: &HashSet<String>) -> ImportResult<ProfileInfo> {
        let emails = checked_emails(profile)?;

        let mut domains: HashSet<String> = profile
            .history
            .iter()
            .filter(|h| self.is_recent(h.end_year))
            .flat_map(|h| subdomains(&h.institution_domain))
            .collect();

        // 没有近期任职时退回邮箱域名
        if domains.is_empty() {
            domains = emails.iter().flat_map(|e| subdomains(e)).collect();
        }
        domains.retain(|d| !common_domains.contains(d));

        let relations = profile
            .relations
            .iter()
            .filter(|r| !RECENT_RELATIONS.contains(&r.relation.as_str()) || self.is_recent(r.end_year))
            .map(|r| r.email.to_lowercase())
            .collect();

        // 年份缺失的论文按近期处理
        let publications = profile
            .publications
            .iter()
            .filter(|p| {
                p.year
                    .filter(|y| *y <= self.current_year)
                    .map(|y| y > self.cut_off_year())
                    .unwrap_or(true)
            })
            .map(|p| p.id.clone())
            .collect();

        Ok(ProfileInfo {
            id: profile.id.clone(),
            domains,
            emails,
            relations,
            publications,
        })
    }
}

/// 按设置选择策略
pub fn policy_from_settings(settings: &EngineSettings) -> Box<dyn ConflictPolicy> {
    match settings.conflict_lookback_years {
        Some(n) => Box::new(RecentConflictPolicy::new(n)),
        None => Box::new(DefaultConflictPolicy),
    }
}

// ==========================================
// SacTransfer - AC 匹配时转移其 SAC 的冲突
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SacTransfer {
    /// AC 档案ID → 已分配的 SAC 档案ID
    pub sacs_by_ac: HashMap<String, Vec<String>>,
    pub sac_profiles: HashMap<String, Profile>,
}

// ==========================================
// ConflictComputer - 冲突计算
// ==========================================
pub struct ConflictComputer {
    policy: Box<dyn ConflictPolicy>,
    common_domains: HashSet<String>,
}

impl ConflictComputer {
    pub fn new(policy: Box<dyn ConflictPolicy>, settings: &EngineSettings) -> Self {
        Self {
            policy,
            common_domains: settings
                .common_email_domains
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(policy_from_settings(settings), settings)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    fn info(&self, profile: &Profile) -> ImportResult<ProfileInfo> {
        self.policy.profile_info(profile, &self.common_domains)
    }

    /// 投稿作者 vs 成员
    ///
    /// # 参数
    /// - author_profiles: 作者ID → 档案（缺失档案的作者被跳过）
    /// - sac_transfer: 匹配 AC 时传入，AC 本身无冲突则检查其 SAC
    #[instrument(skip_all, fields(papers = papers.len(), members = members.len(), policy = self.policy.name()))]
    pub fn paper_conflicts(
        &self,
        papers: &[Paper],
        author_profiles: &HashMap<String, Profile>,
        members: &[Profile],
        sac_transfer: Option<&SacTransfer>,
    ) -> ImportResult<Vec<ConflictEdge>> {
        let member_infos = members
            .iter()
            .map(|p| self.info(p))
            .collect::<ImportResult<Vec<_>>>()?;

        let mut sac_infos: HashMap<&str, ProfileInfo> = HashMap::new();
        if let Some(transfer) = sac_transfer {
            for (id, profile) in &transfer.sac_profiles {
                sac_infos.insert(id.as_str(), self.info(profile)?);
            }
        }

        let mut edges = Vec::new();
        for paper in papers {
            let mut authors = ProfileInfo::default();
            for author_id in &paper.author_ids {
                match author_profiles.get(author_id) {
                    Some(profile) => authors.merge(self.info(profile)?),
                    None => tracing::debug!(author_id = %author_id, "作者档案缺失，跳过"),
                }
            }

            for user in &member_infos {
                let mut conflicts = authors.conflicts_with(user, true);

                if conflicts.is_empty() {
                    if let Some(transfer) = sac_transfer {
                        for sac in transfer.sacs_by_ac.get(&user.id).into_iter().flatten() {
                            if let Some(sac_info) = sac_infos.get(sac.as_str()) {
                                conflicts.extend(authors.conflicts_with(sac_info, true));
                            }
                        }
                    }
                }

                if !conflicts.is_empty() {
                    edges.push(ConflictEdge::exclusion(&paper.id, &user.id));
                }
            }
        }

        tracing::info!(conflicts = edges.len(), "冲突计算完成");
        Ok(edges)
    }

    /// 档案 vs 档案（SAC 对 AC 的匹配，不比较论文）
    #[instrument(skip_all, fields(heads = heads.len(), members = members.len()))]
    pub fn profile_conflicts(&self, heads: &[Profile], members: &[Profile]) -> ImportResult<Vec<ConflictEdge>> {
        let member_infos = members
            .iter()
            .map(|p| self.info(p))
            .collect::<ImportResult<Vec<_>>>()?;

        let mut edges = Vec::new();
        for head in heads {
            let head_info = self.info(head)?;
            for user in &member_infos {
                if !head_info.conflicts_with(user, false).is_empty() {
                    edges.push(ConflictEdge::exclusion(&head_info.id, &user.id));
                }
            }
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common() -> HashSet<String> {
        EngineSettings::default().common_email_domains.into_iter().collect()
    }

    #[test]
    fn test_subdomains() {
        assert_eq!(
            subdomains("johnsmith@iesl.cs.umass.edu"),
            vec!["iesl.cs.umass.edu", "cs.umass.edu", "umass.edu"]
        );
        assert_eq!(subdomains("cs.ox.ac.uk"), vec!["cs.ox.ac.uk", "ox.ac.uk"]);
        assert!(subdomains("localhost").is_empty());
    }

    #[test]
    fn test_common_domains_filtered() {
        let p = Profile::new("~A1").with_email("a@gmail.com");
        let info = DefaultConflictPolicy.profile_info(&p, &common()).unwrap();
        assert!(info.domains.is_empty());
        assert!(info.emails.contains("a@gmail.com"));
    }

    #[test]
    fn test_obfuscated_email_rejected() {
        let p = Profile::new("~A1").with_email("****@mit.edu");
        assert!(matches!(
            DefaultConflictPolicy.profile_info(&p, &common()),
            Err(ImportError::ObfuscatedEmail(_))
        ));
    }

    #[test]
    fn test_recent_policy_drops_old_history_and_coauthors() {
        let policy = RecentConflictPolicy {
            lookback_years: 3,
            current_year: 2026,
        };
        // cut-off = 2022
        let p = Profile::new("~A1")
            .with_email("a@gmail.com")
            .with_history("old.edu", Some(2015))
            .with_history("new.edu", Some(2023))
            .with_relation("old@co.org", "Coauthor", Some(2010))
            .with_relation("advisor@x.org", "Advisor", Some(2010))
            .with_publication("pub-old", Some(2019))
            .with_publication("pub-new", Some(2025));
        let info = policy.profile_info(&p, &common()).unwrap();

        assert!(info.domains.contains("new.edu"));
        assert!(!info.domains.contains("old.edu"));
        assert!(info.relations.contains("advisor@x.org"));
        assert!(!info.relations.contains("old@co.org"));
        assert!(info.publications.contains("pub-new"));
        assert!(!info.publications.contains("pub-old"));
    }

    #[test]
    fn test_recent_policy_falls_back_to_email_domains() {
        let policy = RecentConflictPolicy {
            lookback_years: 1,
            current_year: 2026,
        };
        let p = Profile::new("~A1")
            .with_email("a@cs.umass.edu")
            .with_history("old.edu", Some(2000));
        let info = policy.profile_info(&p, &common()).unwrap();
        assert!(info.domains.contains("umass.edu"));
    }

    #[test]
    fn test_paper_conflicts_with_sac_transfer() {
        let settings = EngineSettings::default();
        let computer = ConflictComputer::new(Box::new(DefaultConflictPolicy), &settings);

        let paper = Paper::new("P1", 1, "V").with_authors(vec!["~Author1".to_string()]);
        let authors: HashMap<String, Profile> = [(
            "~Author1".to_string(),
            Profile::new("~Author1").with_email("author@mit.edu"),
        )]
        .into_iter()
        .collect();

        let members = vec![
            Profile::new("~Same_Inst1").with_history("csail.mit.edu", None),
            Profile::new("~Clean1").with_email("clean@stanford.edu"),
            Profile::new("~Ac_With_Sac1").with_email("ac@berkeley.edu"),
        ];

        let transfer = SacTransfer {
            sacs_by_ac: [("~Ac_With_Sac1".to_string(), vec!["~Sac1".to_string()])]
                .into_iter()
                .collect(),
            sac_profiles: [("~Sac1".to_string(), Profile::new("~Sac1").with_email("sac@mit.edu"))]
                .into_iter()
                .collect(),
        };

        let edges = computer
            .paper_conflicts(&[paper], &authors, &members, Some(&transfer))
            .unwrap();
        let tails: Vec<&str> = edges.iter().map(|e| e.member_id.as_str()).collect();
        assert_eq!(tails, vec!["~Same_Inst1", "~Ac_With_Sac1"]);
        assert!(edges.iter().all(|e| e.is_exclusion()));
    }

    #[test]
    fn test_profile_conflicts_ignore_publications() {
        let settings = EngineSettings::default();
        let computer = ConflictComputer::new(Box::new(DefaultConflictPolicy), &settings);
        let heads = vec![Profile::new("~Ac1").with_publication("shared", None)];
        let members = vec![Profile::new("~Sac1").with_publication("shared", None)];
        assert!(computer.profile_conflicts(&heads, &members).unwrap().is_empty());
    }
}
