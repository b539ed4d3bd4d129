//! 附件扩展名推断
//!
//! 优先级：响应 Content-Type > URL 路径扩展名 > 默认 `jpg`。

use reqwest::Url;

pub const DEFAULT_EXTENSION: &str = "jpg";

/// Content-Type 子类型到扩展名
fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    // "image/png; charset=binary" -> "png"
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let subtype = mime.rsplit('/').next()?;
    match subtype {
        "jpeg" | "jpg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        _ => None,
    }
}

/// URL 路径最后一段的扩展名（不含 query / fragment）
fn extension_from_source(source: &str) -> Option<String> {
    let path = match Url::parse(source) {
        Ok(url) => url.path().to_string(),
        Err(_) => source
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// 推断缓存文件扩展名
pub fn resolve_extension(content_type: Option<&str>, source: &str) -> String {
    content_type
        .and_then(extension_for_content_type)
        .map(str::to_string)
        .or_else(|| extension_from_source(source))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
