//! # HTML Query Service
//!
//! レンダリング済み HTML に対するセレクタ検索（同期・副作用なし）

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// 記事ページの著者情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorInfo {
    /// 著者名
    pub name: Option<String>,
    /// 短い紹介文
    pub bio: Option<String>,
}

impl AuthorInfo {
    /// 記事末尾に付ける著者ブロック（Markdown）
    pub fn markdown_section(&self) -> String {
        let mut section = format!(
            "\n\n>**{}**\n\n",
            self.name.as_deref().unwrap_or_default()
        );
        if let Some(bio) = &self.bio {
            section.push_str(&format!("> *{}*\n\n", bio));
        }
        section.push_str("---\n");
        section
    }
}

/// HTML 検索サービス
pub struct HtmlQuery;

impl HtmlQuery {
    fn selector(css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| anyhow!("invalid CSS selector '{}': {:?}", css, e))
    }

    /// セレクタに一致する要素の数
    pub fn count(html: &str, css: &str) -> Result<usize> {
        let selector = Self::selector(css)?;
        Ok(Html::parse_document(html).select(&selector).count())
    }

    /// セレクタに一致する要素の属性値（文書順、空値は除外）
    pub fn attribute_values(html: &str, css: &str, attribute: &str) -> Result<Vec<String>> {
        let selector = Self::selector(css)?;
        let document = Html::parse_document(html);
        Ok(document
            .select(&selector)
            .filter_map(|el| el.value().attr(attribute))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// 最初に一致した要素の属性値
    pub fn first_attribute(html: &str, css: &str, attribute: &str) -> Result<Option<String>> {
        let selector = Self::selector(css)?;
        let document = Html::parse_document(html);
        Ok(document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr(attribute))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string))
    }

    /// `<title>` の内容
    pub fn title(html: &str) -> Option<String> {
        let selector = Self::selector("title").ok()?;
        let document = Html::parse_document(html);
        let title = document.select(&selector).next().map(inner_text)?;
        if title.is_empty() {
            None
        } else {
            Some(title)
        }
    }

    /// 著者コンテナから名前と紹介文を取り出す
    ///
    /// コンテナが無い場合、または名前も紹介文も空の場合は `None`
    pub fn author(
        html: &str,
        container_css: &str,
        name_css: &str,
        bio_css: &str,
    ) -> Result<Option<AuthorInfo>> {
        let container_selector = Self::selector(container_css)?;
        let name_selector = Self::selector(name_css)?;
        let bio_selector = Self::selector(bio_css)?;
        let document = Html::parse_document(html);

        let Some(container) = document.select(&container_selector).next() else {
            return Ok(None);
        };

        let first_text = |selector: &Selector| {
            container
                .select(selector)
                .next()
                .map(inner_text)
                .filter(|text| !text.is_empty())
        };

        let name = first_text(&name_selector);
        let bio = first_text(&bio_selector);

        if name.is_none() && bio.is_none() {
            return Ok(None);
        }

        Ok(Some(AuthorInfo { name, bio }))
    }

    /// 相対 URL をページ URL 基準で絶対 URL にする
    ///
    /// ```
    /// use issue_courier::domain::services::html::HtmlQuery;
    ///
    /// assert_eq!(
    ///     HtmlQuery::resolve_url("https://example.com/digital/edicao/ed-1", "/digital/artigo/x"),
    ///     Some("https://example.com/digital/artigo/x".to_string())
    /// );
    /// ```
    pub fn resolve_url(base: &str, href: &str) -> Option<String> {
        if let Ok(absolute) = Url::parse(href) {
            return Some(absolute.to_string());
        }
        Url::parse(base)
            .ok()?
            .join(href)
            .ok()
            .map(|url| url.to_string())
    }
}

/// 要素のテキスト（空白を1つにまとめる）
pub fn inner_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
