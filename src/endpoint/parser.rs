//! API 列表文本解析。
//!
//! 每行格式：`[!] [name:] url [{description}] [|weight|...]`，`#` 之后为注释。
//! 解析永不失败：无法识别的行直接跳过。

use super::models::{ApiSource, EndpointRecord};

const DEFAULT_WEIGHT: u32 = 1;

/// 解析整段列表文本，并把权重归一化到总和约为 100。
pub fn parse(text: &str, source: ApiSource) -> Vec<EndpointRecord> {
    let mut records = Vec::new();
    let mut line_number = 0usize;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let line = strip_comment(line);
        if line.is_empty() {
            continue;
        }

        // 被丢弃的行（URL 为空）同样占用行号，已保存的覆盖项依赖这一编号。
        line_number += 1;
        if let Some(record) = parse_line(line, source, line_number) {
            records.push(record);
        }
    }

    normalize_weights(&mut records);
    records
}

/// 解析单行定义，返回未归一化（原始权重）的记录。
pub(crate) fn parse_line(
    line: &str,
    source: ApiSource,
    line_number: usize,
) -> Option<EndpointRecord> {
    let mut supports_params = false;
    let mut rest = line.trim();
    if let Some(stripped) = rest.strip_prefix('!') {
        supports_params = true;
        rest = stripped.trim();
    }

    let (name, mut url) = split_name(rest);
    if let Some(stripped) = url.strip_prefix('!') {
        supports_params = true;
        url = stripped.trim();
    }

    let (url, description) = take_description(url);
    let (url, weight) = take_weight(url);
    if url.is_empty() {
        return None;
    }

    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_api_{}", source.as_str(), line_number));

    Some(EndpointRecord {
        name,
        url,
        weight,
        description,
        enabled: true,
        supports_params,
        params: String::new(),
        source,
        line_number,
    })
}

pub(crate) fn normalize_weights(records: &mut [EndpointRecord]) {
    let total: u64 = records.iter().map(|r| u64::from(r.weight)).sum();
    if total > 0 {
        for record in records.iter_mut() {
            record.weight = (u64::from(record.weight) * 100 / total) as u32;
        }
    } else if !records.is_empty() {
        let each = (100 / records.len()) as u32;
        for record in records.iter_mut() {
            record.weight = each;
        }
    }
}

fn strip_comment(line: &str) -> &str {
    line.find('#').map_or(line, |idx| &line[..idx]).trim()
}

/// `name:url` 拆分：冒号后紧跟 `//` 时视为 URL 协议的一部分。
fn split_name(line: &str) -> (Option<&str>, &str) {
    let Some(colon) = line.find(':') else {
        return (None, line);
    };
    let after = &line[colon + 1..];
    let mut chars = after.chars();
    match (chars.next(), chars.next()) {
        (Some('/'), Some('/')) | (_, None) => (None, line),
        _ => {
            let name = line[..colon].trim();
            if name.is_empty() {
                (None, line)
            } else {
                (Some(name), after.trim())
            }
        }
    }
}

/// 取出 `{...}` 描述：第一个 `{` 到最后一个 `}` 之间的文本。
fn take_description(url: &str) -> (String, String) {
    let (Some(start), Some(end)) = (url.find('{'), url.rfind('}')) else {
        return (url.to_string(), String::new());
    };
    if start >= end {
        return (url.to_string(), String::new());
    }

    let description = url[start + 1..end].trim().to_string();
    let mut joined = url[..start].trim().to_string();
    joined.push_str(url[end + 1..].trim());
    (joined, description)
}

fn take_weight(url: String) -> (String, u32) {
    if !url.contains('|') {
        return (url, DEFAULT_WEIGHT);
    }
    let parts: Vec<&str> = url.split('|').collect();
    if parts.len() >= 3
        && let Ok(raw) = parts[1].trim().parse::<i64>()
    {
        let weight = raw.clamp(0, i64::from(u32::MAX)) as u32;
        return (parts[0].trim().to_string(), weight);
    }
    (url, DEFAULT_WEIGHT)
}
