//! “全员已读”投影。
//!
//! 纯读侧计算：只依赖窗口内消息的时间戳与其他成员的已读水位，
//! 每次请求现算，不缓存、不落库。请求者自身水位的推进是
//! 消息分页的副作用，与这里无关。

use std::collections::HashMap;

use domain::{Message, MessageId, Timestamp};

/// 计算窗口内每条消息是否被所有其他成员读过。
///
/// `other_watermarks` 是除请求者以外每个成员的 `last_read_at`。
/// 没有其他成员时一律为 `false`：没人可读就谈不上"全员已读"。
pub fn read_by_all_map(
    messages: &[Message],
    other_watermarks: &[Option<Timestamp>],
) -> HashMap<MessageId, bool> {
    messages
        .iter()
        .map(|message| {
            let read = !other_watermarks.is_empty()
                && other_watermarks
                    .iter()
                    .all(|watermark| watermark.is_some_and(|ts| ts >= message.created_at));
            (message.id, read)
        })
        .collect()
}
