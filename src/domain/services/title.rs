//! # Title Service
//!
//! 記事タイトルの整形と、配信用ファイル名の導出

/// パッケージの拡張子
pub const PACKAGE_EXTENSION: &str = "epub";

/// タイトル整形サービス
pub struct TitleService;

impl TitleService {
    /// ページタイトルから定型の接尾辞と区切りを取り除く
    ///
    /// 区切り文字は順に適用され、それぞれ最初の出現より前だけを残す。
    /// その後、定型文字列をすべて削除して前後の空白を落とす。
    ///
    /// ```
    /// use issue_courier::domain::services::title::TitleService;
    ///
    /// let separators = vec!["|".to_string(), " - ".to_string()];
    /// let boilerplate = vec!["Revista".to_string(), "–".to_string()];
    /// assert_eq!(
    ///     TitleService::clean_article_title("A Crise – Revista | Site", &separators, &boilerplate),
    ///     "A Crise"
    /// );
    /// ```
    pub fn clean_article_title(raw: &str, separators: &[String], boilerplate: &[String]) -> String {
        let mut title = raw.to_string();

        for separator in separators.iter().filter(|s| !s.is_empty()) {
            if let Some(index) = title.find(separator.as_str()) {
                title.truncate(index);
            }
        }

        for noise in boilerplate.iter().filter(|s| !s.is_empty()) {
            title = title.replace(noise.as_str(), "");
        }

        title.trim().to_string()
    }

    /// スラッグから表示用タイトルを作る
    ///
    /// `-` を空白に置き換え、単語の先頭を大文字にし、置換表を適用する
    ///
    /// ```
    /// use issue_courier::domain::services::title::TitleService;
    ///
    /// let replacements = vec![("Edicao".to_string(), "Edição".to_string())];
    /// assert_eq!(TitleService::display_title("edicao-18", &replacements), "Edição 18");
    /// ```
    pub fn display_title(slug: &str, replacements: &[(String, String)]) -> String {
        let mut title = title_case(&slug.replace('-', " "));
        for (from, to) in replacements.iter().filter(|(from, _)| !from.is_empty()) {
            title = title.replace(from.as_str(), to);
        }
        title
    }

    /// 配信用ファイル名（`{タイトル} ({著者}).epub`）
    pub fn packaged_file_name(display_title: &str, author: &str) -> String {
        format!("{} ({}).{}", display_title, author, PACKAGE_EXTENSION)
    }

    /// 旧形式のファイル名（`{スラッグ}.epub`）
    pub fn legacy_file_name(slug: &str) -> String {
        format!("{}.{}", slug, PACKAGE_EXTENSION)
    }
}

/// 英字の連続の先頭だけを大文字にし、残りを小文字にする
fn title_case(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut previous_is_letter = false;

    for ch in input.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                output.extend(ch.to_lowercase());
            } else {
                output.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            output.push(ch);
            previous_is_letter = false;
        }
    }

    output
}
