//! API 端点的数据模型。
//!
//! `EndpointRecord` 对应列表文件中的一行定义；`EndpointOverride` 是用户在设置中
//! 修改过、需要持久化到 `config.yml` 的字段子集。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 端点来源：远程推荐列表或本地 `apis.txt`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiSource {
    #[default]
    Recommended,
    Local,
}

impl ApiSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiSource::Recommended => "recommended",
            ApiSource::Local => "local",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ApiSource::Recommended => "推荐API",
            ApiSource::Local => "本地API",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ApiSource::Recommended => ApiSource::Local,
            ApiSource::Local => ApiSource::Recommended,
        }
    }
}

impl fmt::Display for ApiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recommended" | "r" => Ok(ApiSource::Recommended),
            "local" | "l" => Ok(ApiSource::Local),
            other => Err(format!("未知的API来源: {other}（可选 recommended / local）")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub name: String,
    pub url: String,
    pub weight: u32,
    pub description: String,
    pub enabled: bool,
    pub supports_params: bool,
    pub params: String,
    pub source: ApiSource,
    pub line_number: usize,
}

impl EndpointRecord {
    /// 持久化覆盖项使用的键：`{name}_{line_number}`。
    pub fn override_key(&self) -> String {
        format!("{}_{}", self.name, self.line_number)
    }

    pub fn same_identity(&self, other: &EndpointRecord) -> bool {
        self.name == other.name && self.source == other.source
    }

    /// 附加用户参数后的实际请求地址。
    pub fn request_url(&self) -> String {
        append_query(&self.url, &self.params)
    }

    pub fn to_override(&self) -> EndpointOverride {
        EndpointOverride {
            weight: Some(self.weight),
            params: Some(self.params.clone()),
            enabled: Some(self.enabled),
            line_number: self.line_number,
        }
    }

    /// 把已保存的覆盖项写回到刚解析出的记录上；缺省字段保持原值。
    pub fn apply_override(&mut self, saved: &EndpointOverride) {
        if let Some(weight) = saved.weight {
            self.weight = weight.min(100);
        }
        if let Some(params) = &saved.params {
            self.params = params.clone();
        }
        if let Some(enabled) = saved.enabled {
            self.enabled = enabled;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub line_number: usize,
}

pub(crate) fn append_query(url: &str, params: &str) -> String {
    let params = params.trim().trim_start_matches(['?', '&']);
    if params.is_empty() {
        return url.to_string();
    }
    if url.contains('?') {
        format!("{url}&{params}")
    } else {
        format!("{url}?{params}")
    }
}
