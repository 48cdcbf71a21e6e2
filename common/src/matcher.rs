//! エンドポイントマッチャー
//!
//! (method, path) をモックエンドポイントに解決する。
//!
//! - メソッドは完全一致
//! - パスはURIテンプレート: リテラルセグメントは完全一致、`{name}` は任意の1セグメント
//! - 複数一致時はより具体的なものを優先（テンプレート数が少ない → リテラル接頭辞が長い → 更新日時が新しい）

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CommonError, CommonResult};
use crate::types::{HttpMethod, MockApis};

/// テンプレートのセグメント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// リテラル
    Literal(String),
    /// `{name}` 変数
    Variable(String),
}

/// パースされたURIテンプレート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

/// 具体性（大きいほど優先）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specificity {
    /// 変数セグメント数
    pub variables: usize,
    /// 先頭から連続するリテラルセグメント数
    pub literal_prefix: usize,
    /// 先頭リテラル部分の文字数
    pub literal_prefix_chars: usize,
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        // 変数が少ないほど具体的
        other
            .variables
            .cmp(&self.variables)
            .then(self.literal_prefix.cmp(&other.literal_prefix))
            .then(self.literal_prefix_chars.cmp(&other.literal_prefix_chars))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// パスを正規化する（クエリ・フラグメント除去、先頭スラッシュ付与、末尾スラッシュ除去）
pub fn normalize_path(path: &str) -> String {
    let without_query = path.split(['?', '#']).next().unwrap_or("");
    let segments: Vec<&str> = split_segments(without_query).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl PathTemplate {
    /// テンプレート文字列をパースする
    pub fn parse(template: &str) -> CommonResult<Self> {
        let invalid = |reason: &str| CommonError::InvalidPathTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        if template.contains(['?', '#']) {
            return Err(invalid("query and fragment are not allowed"));
        }

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        for raw in split_segments(template) {
            if !raw.contains(['{', '}']) {
                segments.push(Segment::Literal(raw.to_string()));
                continue;
            }
            let name = raw
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .ok_or_else(|| invalid("a variable must occupy a whole segment"))?;
            if name.is_empty() || name.contains(['{', '}']) {
                return Err(invalid("malformed variable name"));
            }
            if names.contains(&name) {
                return Err(invalid("duplicate variable name"));
            }
            names.push(name);
            segments.push(Segment::Variable(name.to_string()));
        }

        Ok(Self {
            raw: normalize_path(template),
            segments,
        })
    }

    /// 正規化済みのテンプレート文字列
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// セグメント一覧
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 具体性を算出
    pub fn specificity(&self) -> Specificity {
        let variables = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Variable(_)))
            .count();
        let prefix: Vec<&String> = self
            .segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(lit) => Some(lit),
                Segment::Variable(_) => None,
            })
            .collect();
        Specificity {
            variables,
            literal_prefix: prefix.len(),
            literal_prefix_chars: prefix.iter().map(|s| s.len()).sum(),
        }
    }

    /// パスがテンプレートに一致するか
    pub fn matches(&self, path: &str) -> bool {
        self.captures(path).is_some()
    }

    /// 一致した場合、変数名→値のマップを返す
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let without_query = path.split(['?', '#']).next().unwrap_or("");
        let parts: Vec<&str> = split_segments(without_query).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Variable(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

/// 2つのエンドポイントが「同一」か判定する（方向付き: パターン対リテラル）
///
/// インポート・関連付け時に、既存のモックエンドポイント（パターン）と
/// 実APIのパス（リテラルとして扱う）を比較するために使う。
pub fn is_same_identity(
    pattern_method: HttpMethod,
    pattern: &str,
    method: HttpMethod,
    endpoint: &str,
) -> bool {
    if pattern_method != method {
        return false;
    }
    match PathTemplate::parse(pattern) {
        Ok(template) => template.matches(endpoint),
        Err(_) => normalize_path(pattern) == normalize_path(endpoint),
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    apis: Arc<MockApis>,
    template: PathTemplate,
    specificity: Specificity,
}

/// マッチ結果
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    /// 一致したモックエンドポイント
    pub apis: &'a Arc<MockApis>,
    /// パス変数
    pub params: HashMap<String, String>,
}

/// 1つのモックサービスに属するエンドポイント集合に対するマッチャー
///
/// 構築時に優先順位でソートしておき、検索では最初に一致したものを返す。
#[derive(Debug, Clone, Default)]
pub struct EndpointMatcher {
    routes: Vec<CompiledRoute>,
}

impl EndpointMatcher {
    /// エンドポイント一覧からマッチャーを構築
    ///
    /// テンプレートが不正なエンドポイントはスキップする。
    pub fn new(apis: impl IntoIterator<Item = MockApis>) -> Self {
        let mut routes: Vec<CompiledRoute> = apis
            .into_iter()
            .filter_map(|apis| match PathTemplate::parse(&apis.endpoint) {
                Ok(template) => {
                    let specificity = template.specificity();
                    Some(CompiledRoute {
                        apis: Arc::new(apis),
                        template,
                        specificity,
                    })
                }
                Err(e) => {
                    tracing::warn!(apis_id = %apis.id, error = %e, "Skipping mock apis with invalid endpoint");
                    None
                }
            })
            .collect();

        routes.sort_by(|a, b| {
            b.specificity
                .cmp(&a.specificity)
                .then(b.apis.updated_at.cmp(&a.apis.updated_at))
        });

        Self { routes }
    }

    /// (method, path) に一致するエンドポイントを検索
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.apis.method == method)
            .find_map(|route| {
                route.template.captures(path).map(|params| RouteMatch {
                    apis: &route.apis,
                    params,
                })
            })
    }

    /// 登録エンドポイント数
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// 空か
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 優先順位順にエンドポイントを列挙
    pub fn apis(&self) -> impl Iterator<Item = &Arc<MockApis>> {
        self.routes.iter().map(|route| &route.apis)
    }
}
