//! SSE 分帧
//!
//! 按字节缓冲，遇到空行（\n\n）切出一帧；只在整帧到齐后才解码 UTF-8，
//! 因此任意位置的分包（包括多字节字符中间）都不会损坏内容。
//! 已扫描过的前缀不再重复扫描；单帧超过上限时报错一次并丢弃到下一个帧边界。

use crate::core::FrameError;

/// 单帧默认上限
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// 分隔符最长 4 字节，续扫时回退 3 字节以接住跨包的分隔符
const BOUNDARY_OVERLAP: usize = 3;

/// 一帧 SSE：可选 event 行 + 拼接后的 data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
    /// buffer 中已确认不含帧边界的前缀长度
    scanned: usize,
    max_frame_bytes: usize,
    /// 正在丢弃一个超长帧的剩余部分
    discarding: bool,
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_frame_bytes,
            discarding: false,
        }
    }

    /// 追加一段字节，返回本次凑齐的帧（纯注释帧、空帧不返回）；超长帧报一次 Oversized
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseFrame, FrameError>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            let from = self.scanned.saturating_sub(BOUNDARY_OVERLAP);
            let Some((end, sep_len)) = find_boundary(&self.buffer, from) else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > self.max_frame_bytes {
                    if !self.discarding {
                        tracing::warn!(limit = self.max_frame_bytes, "oversized SSE frame discarded");
                        frames.push(Err(FrameError::Oversized {
                            limit: self.max_frame_bytes,
                        }));
                        self.discarding = true;
                    }
                    let cut = self.buffer.len() - BOUNDARY_OVERLAP.min(self.buffer.len());
                    self.buffer.drain(..cut);
                    self.scanned = self.buffer.len();
                }
                break;
            };
            let raw: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw)) {
                frames.push(Ok(frame));
            }
        }
        frames
    }

    /// 流结束：把末尾未以空行结束的残帧也解析出来
    pub fn finish(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        let text = String::from_utf8_lossy(&raw);
        if text.trim().is_empty() {
            return None;
        }
        parse_frame(&text)
    }
}

/// 从 from 开始找第一个帧边界，返回位置与分隔符长度（兼容 \r\n\r\n）
fn find_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_across_chunks() {
        let mut s = FrameSplitter::new();
        assert!(s.push(b"event: start\nda").is_empty());
        let frames = s.push(b"ta: {\"a\":1}\n\nevent: fi");
        assert_eq!(
            frames,
            vec![Ok(SseFrame {
                event: Some("start".into()),
                data: "{\"a\":1}".into()
            })]
        );
        let frames = s.push(b"nal\ndata: {}\r\n\r\n");
        assert_eq!(frames[0].as_ref().unwrap().event.as_deref(), Some("final"));
    }

    #[test]
    fn test_multibyte_char_split() {
        let payload = "data: {\"t\":\"日志\"}\n\n".as_bytes();
        // 在「日」的第二个字节处切开
        let cut = payload.iter().position(|b| *b == 0xE6).unwrap() + 1;
        let mut s = FrameSplitter::new();
        assert!(s.push(&payload[..cut]).is_empty());
        let frames = s.push(&payload[cut..]);
        assert_eq!(frames[0].as_ref().unwrap().data, "{\"t\":\"日志\"}");
    }

    #[test]
    fn test_boundary_split_between_pushes() {
        let mut s = FrameSplitter::new();
        for b in b"data: 1\r\n\r".iter() {
            assert!(s.push(std::slice::from_ref(b)).is_empty());
        }
        let frames = s.push(b"\ndata: 2\n");
        assert_eq!(frames, vec![Ok(SseFrame { event: None, data: "1".into() })]);
        let frames = s.push(b"\n");
        assert_eq!(frames, vec![Ok(SseFrame { event: None, data: "2".into() })]);
    }

    #[test]
    fn test_oversized_frame_reported_once_then_recovers() {
        let mut s = FrameSplitter::with_max_frame_bytes(16);
        let mut errors = Vec::new();
        for _ in 0..10 {
            errors.extend(s.push(b"data: xxxxxxxxxx"));
        }
        assert_eq!(errors, vec![Err(FrameError::Oversized { limit: 16 })]);
        assert!(s.buffer.len() <= 16);

        // 超长帧的尾部被丢弃，下一帧正常产出
        let frames = s.push(b"xx\n\ndata: ok\n\n");
        assert_eq!(frames, vec![Ok(SseFrame { event: None, data: "ok".into() })]);
    }

    #[test]
    fn test_comments_and_trailing_frame() {
        let mut s = FrameSplitter::new();
        assert!(s.push(b": keep-alive\n\n").is_empty());
        assert!(s.push(b"data: [DONE]").is_empty());
        assert_eq!(s.finish().unwrap().data, "[DONE]");
        assert!(s.finish().is_none());
    }
}
