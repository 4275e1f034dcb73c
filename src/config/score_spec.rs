use crate::domain::edge::ScoreEdge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个评分来源的聚合参数
///
/// 存储位置：分配配置的 scores_specification 字段（key 为评分来源 invitation id）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSourceSpec {
    /// 权重（默认 1）
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// 该来源缺失评分时使用的默认值
    #[serde(default)]
    pub default: f64,

    /// 标签 → 数值映射（投标等标签型评分）
    #[serde(default)]
    pub translate_map: Option<BTreeMap<String, f64>>,
}

fn default_weight() -> f64 {
    1.0
}

impl ScoreSourceSpec {
    pub fn weighted(weight: f64) -> Self {
        Self {
            weight,
            default: 0.0,
            translate_map: None,
        }
    }

    /// 单条评分边的取值：标签优先查 translate_map，其次数值权重，最后默认值
    pub fn value_of(&self, edge: Option<&ScoreEdge>) -> f64 {
        let Some(edge) = edge else {
            return self.default;
        };
        if let (Some(map), Some(label)) = (&self.translate_map, &edge.label) {
            if let Some(v) = map.get(label) {
                return *v;
            }
        }
        edge.weight.unwrap_or(self.default)
    }
}

/// 评分聚合规格：Σ weight_s · value_s(p, m)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSpecification {
    pub sources: BTreeMap<String, ScoreSourceSpec>,
}

impl ScoreSpecification {
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let spec: ScoreSpecification = serde_json::from_value(value)?;
        for (source, s) in &spec.sources {
            let map_ok = s
                .translate_map
                .as_ref()
                .map(|m| m.values().all(|v| v.is_finite()))
                .unwrap_or(true);
            if !s.weight.is_finite() || !s.default.is_finite() || !map_ok {
                return Err(serde::de::Error::custom(format!(
                    "评分来源 {} 含非有限数值",
                    source
                )));
            }
        }
        Ok(spec)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn with_source(mut self, source: &str, spec: ScoreSourceSpec) -> Self {
        self.sources.insert(source.to_string(), spec);
        self
    }

    /// 投标标签的默认映射
    pub fn bid_translate_map() -> BTreeMap<String, f64> {
        [
            ("Very High", 1.0),
            ("High", 0.5),
            ("Neutral", 0.0),
            ("Low", -0.5),
            ("Very Low", -1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// 匹配组的默认规格：亲和度、投标、推荐各权重 1，默认 0
    pub fn default_for_group(match_group: &str, with_bids: bool, with_recommendations: bool) -> Self {
        let mut spec = Self::default().with_source(
            &format!("{}/-/Affinity_Score", match_group),
            ScoreSourceSpec::weighted(1.0),
        );
        if with_bids {
            spec = spec.with_source(
                &format!("{}/-/Bid", match_group),
                ScoreSourceSpec {
                    weight: 1.0,
                    default: 0.0,
                    translate_map: Some(Self::bid_translate_map()),
                },
            );
        }
        if with_recommendations {
            spec = spec.with_source(
                &format!("{}/-/Recommendation", match_group),
                ScoreSourceSpec::weighted(1.0),
            );
        }
        spec
    }
}
