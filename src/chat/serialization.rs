//! 时间戳与压缩编解码工具

use chrono::{DateTime, SecondsFormat, Utc};
use flate2::read::GzDecoder;
use std::io::Read;

/// 按 ISO-8601（UTC、毫秒精度）格式化时间戳
pub fn to_iso8601(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 当前时间的 ISO-8601 表示
pub fn now_iso8601() -> String {
    to_iso8601(&Utc::now())
}

/// 解析 ISO-8601 时间戳（统一换算到 UTC）
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// 判断数据是否为 gzip 帧（魔数 0x1f 0x8b）
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// 解压 gzip 数据
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
