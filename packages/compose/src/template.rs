//! Built-in template catalog
//!
//! Describes the form each publicity template asks for, and validates a
//! submitted form before anything is sent to the Generation Service.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Date,
    Textarea,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub id: String,
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl TemplateSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, TemplateSpec>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: TemplateSpec) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<&TemplateSpec> {
        self.templates.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Check that `template_id` exists and every required field is filled
    pub fn validate(
        &self,
        template_id: &str,
        form: &BTreeMap<String, String>,
    ) -> Result<&TemplateSpec, ValidationError> {
        let template = self
            .get(template_id)
            .ok_or_else(|| ValidationError::UnknownTemplate(template_id.to_string()))?;

        for field in template.required_fields() {
            let filled = form.get(&field.name).is_some_and(|v| !v.trim().is_empty());
            if !filled {
                return Err(ValidationError::MissingField {
                    template: template.id.clone(),
                    field: field.name.clone(),
                });
            }
        }

        Ok(template)
    }

    /// The six publicity templates
    pub fn builtin() -> Self {
        let mut catalog = Self::new();

        catalog.insert(template(
            "meeting",
            "会议纪要",
            vec![
                title("会议主题", "例如：2023年度总结表彰大会"),
                date("会议时间"),
                text("location", "会议地点", Some("例如：公司一号会议室")),
                text("attendees", "参会人员", Some("例如：公司领导班子、各部门负责人")),
                summary("简要描述会议主要议程、强调重点..."),
            ],
        ));
        catalog.insert(template(
            "training",
            "培训活动",
            vec![
                title("培训主题", "例如：合规风控专题培训"),
                date("培训时间"),
                text("location", "培训地点", None),
                text("lecturer", "培训讲师", None),
                summary("简要描述培训背景、主要内容..."),
            ],
        ));
        catalog.insert(template(
            "inspection",
            "领导检查",
            vec![
                title("检查主题", "例如：安全生产专项检查"),
                date("检查时间"),
                text("location", "检查地点", None),
                text("leader", "带队领导", None),
                text("attendees", "陪同人员", None),
                summary("简要描述检查重点、发现问题及指示..."),
            ],
        ));
        catalog.insert(template(
            "bid_winning",
            "中标喜报",
            vec![
                title("项目名称", "例如：某产业园施工总承包项目"),
                date("中标时间"),
                text("location", "项目地点", None),
                textarea("project_intro", "项目介绍", "项目规模、建设内容、中标金额等..."),
                summary("中标意义、团队努力..."),
            ],
        ));
        catalog.insert(template(
            "project_progress",
            "项目进展",
            vec![
                field("title", "项目名称", FieldKind::Text, None, true),
                date("当前时间"),
                text("location", "项目地点", None),
                text("milestone", "关键节点", Some("例如：主体结构封顶")),
                summary("施工进展、攻坚克难情况..."),
            ],
        ));
        catalog.insert(template(
            "innovation",
            "科技创新",
            vec![
                field("title", "成果名称", FieldKind::Text, None, true),
                date("获奖/认定时间"),
                textarea("achievements", "主要成果", "技术创新点、应用效果..."),
                summary("研发历程、未来展望..."),
            ],
        ));

        catalog
    }
}

fn template(id: &str, name: &str, fields: Vec<FieldSpec>) -> TemplateSpec {
    TemplateSpec {
        id: id.to_string(),
        name: name.to_string(),
        fields,
    }
}

fn field(
    name: &str,
    label: &str,
    kind: FieldKind,
    placeholder: Option<&str>,
    required: bool,
) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        label: label.to_string(),
        kind,
        placeholder: placeholder.map(str::to_string),
        required,
    }
}

fn title(label: &str, placeholder: &str) -> FieldSpec {
    field("title", label, FieldKind::Text, Some(placeholder), true)
}

fn date(label: &str) -> FieldSpec {
    field("date", label, FieldKind::Date, None, false)
}

fn text(name: &str, label: &str, placeholder: Option<&str>) -> FieldSpec {
    field(name, label, FieldKind::Text, placeholder, false)
}

fn textarea(name: &str, label: &str, placeholder: &str) -> FieldSpec {
    field(name, label, FieldKind::Textarea, Some(placeholder), false)
}

fn summary(placeholder: &str) -> FieldSpec {
    textarea("summary", "内容摘要", placeholder)
}
