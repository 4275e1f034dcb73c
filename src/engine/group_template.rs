// ==========================================
// 评审分配引擎 - 单篇投稿委员会组 id 模板
// ==========================================
// 语法: 字面量 + {venue_id} / {number} / {committee}，{{ 与 }} 转义
// 红线: 模板在配置加载时解析一次，渲染时不再解释字符串
// 红线: 模板必须包含 {number}（每篇投稿一个组）
// ==========================================

use crate::domain::error::ValidationError;
use std::fmt;
use std::str::FromStr;

/// 模板变量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateVar {
    VenueId,
    Number,
    Committee,
}

impl TemplateVar {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "venue_id" => Some(TemplateVar::VenueId),
            "number" => Some(TemplateVar::Number),
            "committee" => Some(TemplateVar::Committee),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TemplateVar::VenueId => "venue_id",
            TemplateVar::Number => "number",
            TemplateVar::Committee => "committee",
        }
    }
}

/// 模板语法树节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateNode {
    Literal(String),
    Var(TemplateVar),
}

/// 渲染上下文
#[derive(Debug, Clone, Copy)]
pub struct GroupContext<'a> {
    pub venue_id: &'a str,
    pub number: u32,
    pub committee: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTemplate {
    nodes: Vec<TemplateNode>,
}

impl GroupTemplate {
    /// 解析模板
    pub fn parse(source: &str) -> Result<Self, ValidationError> {
        const FIELD: &str = "committee_group_template";
        let mut nodes = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(ValidationError::field(FIELD, format!("'{{{}' 缺少右括号", name)));
                    }
                    let var = TemplateVar::from_name(&name)
                        .ok_or_else(|| ValidationError::field(FIELD, format!("未知模板变量 '{}'", name)))?;
                    if !literal.is_empty() {
                        nodes.push(TemplateNode::Literal(std::mem::take(&mut literal)));
                    }
                    nodes.push(TemplateNode::Var(var));
                }
                '}' => return Err(ValidationError::field(FIELD, "多余的右括号")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            nodes.push(TemplateNode::Literal(literal));
        }

        if !nodes.contains(&TemplateNode::Var(TemplateVar::Number)) {
            return Err(ValidationError::field(FIELD, "模板必须包含 {number}"));
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    /// 渲染组 id
    pub fn render(&self, ctx: &GroupContext<'_>) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                TemplateNode::Literal(s) => out.push_str(s),
                TemplateNode::Var(TemplateVar::VenueId) => out.push_str(ctx.venue_id),
                TemplateNode::Var(TemplateVar::Number) => out.push_str(&ctx.number.to_string()),
                TemplateNode::Var(TemplateVar::Committee) => out.push_str(ctx.committee),
            }
        }
        out
    }
}

impl FromStr for GroupTemplate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GroupTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            match node {
                TemplateNode::Literal(s) => write!(f, "{}", s.replace('{', "{{").replace('}', "}}"))?,
                TemplateNode::Var(v) => write!(f, "{{{}}}", v.name())?,
            }
        }
        Ok(())
    }
}
