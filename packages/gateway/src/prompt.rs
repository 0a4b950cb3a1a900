//! Prompt construction for the upstream model

use scribe_compose::{GenerateRequest, RewriteRequest};
use std::collections::BTreeMap;

/// Characters of surrounding text quoted in a rewrite prompt
pub const REWRITE_CONTEXT_CHARS: usize = 200;

const FORMAT_RULES: &str = "1. 使用HTML格式输出，只返回<body>标签内的内容。\n2. 标题使用<h2>标签，居中对齐。\n3. 正文分段清晰，使用<p>标签，每段开头空两格（使用&emsp;&emsp;）。";

/// Placeholders substituted into template prompts; absent fields become empty
const FIELDS: &[&str] = &[
    "title",
    "date",
    "location",
    "attendees",
    "leader",
    "lecturer",
    "project_intro",
    "milestone",
    "achievements",
    "summary",
];

fn template_body(template_type: &str) -> Option<(&'static str, &'static str, &'static str)> {
    // (task, facts section, extra rules)
    let body = match template_type {
        "meeting" => (
            "请根据以下会议信息和参考材料，写一篇正式的会议纪要宣传稿。",
            "【会议要素】\n主题：{title}\n时间：{date}\n地点：{location}\n参会人员：{attendees}\n内容摘要：{summary}",
            "4. 重点内容（如讲话要点）使用<strong>加粗。\n5. 语气庄重、客观。",
        ),
        "training" => (
            "请根据以下培训活动信息，写一篇生动的培训活动宣传稿。",
            "【活动要素】\n主题：{title}\n时间：{date}\n地点：{location}\n讲师：{lecturer}\n内容摘要：{summary}",
            "4. 突出培训目的、现场氛围、学员收获。\n5. 语气积极向上。",
        ),
        "inspection" => (
            "请根据以下领导检查信息，写一篇正式的迎检宣传稿。",
            "【检查要素】\n主题：{title}\n时间：{date}\n地点：{location}\n带队领导：{leader}\n陪同人员：{attendees}\n内容摘要：{summary}",
            "4. 重点描述检查过程、领导指示、后续整改或落实措施。\n5. 语气严谨。",
        ),
        "bid_winning" => (
            "请根据以下中标信息，写一篇振奋人心的中标喜报。",
            "【中标要素】\n项目名称：{title}\n时间：{date}\n地点：{location}\n项目介绍：{project_intro}\n内容摘要：{summary}",
            "4. 介绍项目概况、中标意义、团队努力。\n5. 语气热烈、自信。",
        ),
        "project_progress" => (
            "请根据以下项目进展信息，写一篇项目通讯稿。",
            "【项目要素】\n项目名称：{title}\n时间：{date}\n地点：{location}\n关键节点：{milestone}\n内容摘要：{summary}",
            "4. 描述施工现场情况、攻坚克难过程、节点意义。\n5. 语气务实、鼓舞人心。",
        ),
        "innovation" => (
            "请根据以下科技创新成果，写一篇科技成果宣传稿。",
            "【创新要素】\n成果名称：{title}\n时间：{date}\n主要成果：{achievements}\n内容摘要：{summary}",
            "4. 介绍研发背景、技术难点、创新点、应用价值。\n5. 语气专业、具有前瞻性。",
        ),
        _ => return None,
    };
    Some(body)
}

/// Substitute `{field}` placeholders in one pass over the template
///
/// Values are copied verbatim; braces inside them are never expanded.
fn fill(template: &str, form: &BTreeMap<String, String>) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        filled.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').map(|close| &after[..close]) {
            Some(name) if FIELDS.contains(&name) => {
                filled.push_str(form.get(name).map(String::as_str).unwrap_or(""));
                rest = &after[name.len() + 1..];
            }
            _ => {
                filled.push('{');
                rest = after;
            }
        }
    }
    filled.push_str(rest);
    filled
}

/// Prompt for a fresh document
pub fn build_prompt(request: &GenerateRequest) -> String {
    match template_body(&request.template_type) {
        Some((task, facts, rules)) => format!(
            "你是一个专业的企业宣传稿撰写助手。{task}\n\n{facts}\n\n【参考材料】\n{context}\n\n【要求】\n{FORMAT_RULES}\n{rules}",
            facts = fill(facts, &request.form_data),
            context = request.context_text,
        ),
        None => {
            let form = serde_json::to_string(&request.form_data).unwrap_or_default();
            format!(
                "请根据以下信息写一篇宣传稿：\n{form}\n\n参考材料：\n{}",
                request.context_text
            )
        }
    }
}

/// Prompt for a scoped rewrite
pub fn rewrite_prompt(request: &RewriteRequest) -> String {
    let before = last_chars(&request.context_before, REWRITE_CONTEXT_CHARS);
    let after = first_chars(&request.context_after, REWRITE_CONTEXT_CHARS);

    format!(
        "请对以下这段文字进行【{label}】：\n\n\"{text}\"\n\n上下文参考：\n前文：...{before}\n后文：{after}...\n\n要求：只返回修改后的文本，不要包含解释性语言。",
        label = request.command.label(),
        text = request.text,
    )
}

fn last_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

fn first_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
