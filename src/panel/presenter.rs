//! 浮窗呈现接口
//!
//! 渲染器只通过 `OverlayPresenter` 操作浮窗，浮窗本身不保存任何翻译状态。

use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use super::geometry::{Point, Rect, Size, Viewport};

/// 流式显示时附加在文本末尾的光标
pub const STREAM_CURSOR: char = '|';

/// 浮窗内容
#[derive(Debug, Clone, PartialEq)]
pub enum PanelView {
    Hidden,
    Loading { streaming: bool },
    /// 正在打字的文本（末尾带光标）
    Streaming { text: String },
    Final {
        text: String,
        pronunciation: Option<String>,
    },
    Error { message: String },
}

impl PanelView {
    /// 当前可见的译文（不含光标）
    pub fn text(&self) -> Option<&str> {
        match self {
            PanelView::Streaming { text } | PanelView::Final { text, .. } => Some(text),
            _ => None,
        }
    }
}

pub trait OverlayPresenter: Send {
    fn show(&mut self, position: Point);
    fn hide(&mut self);
    fn render(&mut self, view: &PanelView);
    fn bounding_box(&self) -> Rect;
    fn viewport(&self) -> Viewport;
    fn move_to(&mut self, position: Point);
}

// ============================================================
// 内存实现（测试与无界面运行）
// ============================================================

#[derive(Debug, Clone)]
pub struct PresenterLog {
    pub visible: bool,
    pub position: Point,
    pub views: Vec<PanelView>,
    pub moves: usize,
}

/// 记录所有渲染结果的浮窗；尺寸随文本长度增长
pub struct MemoryPresenter {
    log: Arc<Mutex<PresenterLog>>,
    viewport: Viewport,
    size: Size,
}

/// `MemoryPresenter` 的只读观察端
#[derive(Clone)]
pub struct PresenterProbe {
    log: Arc<Mutex<PresenterLog>>,
}

const MEMORY_PANEL_WIDTH: f64 = 300.0;
const MEMORY_LINE_HEIGHT: f64 = 20.0;
const MEMORY_CHARS_PER_LINE: usize = 24;

impl MemoryPresenter {
    pub fn new(viewport: Viewport) -> (Self, PresenterProbe) {
        let log = Arc::new(Mutex::new(PresenterLog {
            visible: false,
            position: Point::default(),
            views: Vec::new(),
            moves: 0,
        }));
        (
            Self {
                log: log.clone(),
                viewport,
                size: Size {
                    width: MEMORY_PANEL_WIDTH,
                    height: MEMORY_LINE_HEIGHT * 2.0,
                },
            },
            PresenterProbe { log },
        )
    }

    fn with_log(&self, f: impl FnOnce(&mut PresenterLog)) {
        if let Ok(mut log) = self.log.lock() {
            f(&mut log);
        }
    }
}

impl OverlayPresenter for MemoryPresenter {
    fn show(&mut self, position: Point) {
        self.with_log(|log| {
            log.visible = true;
            log.position = position;
        });
    }

    fn hide(&mut self) {
        self.with_log(|log| {
            log.visible = false;
            log.views.push(PanelView::Hidden);
        });
    }

    fn render(&mut self, view: &PanelView) {
        let chars = view
            .text()
            .map(|t| t.chars().count())
            .unwrap_or_default();
        let lines = chars.div_ceil(MEMORY_CHARS_PER_LINE).max(1);
        self.size.height = MEMORY_LINE_HEIGHT * (lines as f64 + 1.0);
        self.with_log(|log| log.views.push(view.clone()));
    }

    fn bounding_box(&self) -> Rect {
        let origin = self
            .log
            .lock()
            .map(|log| log.position)
            .unwrap_or_default();
        Rect {
            origin,
            size: self.size,
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn move_to(&mut self, position: Point) {
        self.with_log(|log| {
            log.position = position;
            log.moves += 1;
        });
    }
}

impl PresenterProbe {
    pub fn snapshot(&self) -> Option<PresenterLog> {
        self.log.lock().ok().map(|log| log.clone())
    }

    pub fn views(&self) -> Vec<PanelView> {
        self.snapshot().map(|log| log.views).unwrap_or_default()
    }

    /// 所有流式中间态文本，按渲染顺序
    pub fn streamed_texts(&self) -> Vec<String> {
        self.views()
            .into_iter()
            .filter_map(|view| match view {
                PanelView::Streaming { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_view(&self) -> Option<PanelView> {
        self.views().pop()
    }

    pub fn is_visible(&self) -> bool {
        self.snapshot().map(|log| log.visible).unwrap_or(false)
    }

    pub fn position(&self) -> Point {
        self.snapshot().map(|log| log.position).unwrap_or_default()
    }
}

// ============================================================
// 终端实现（演示程序）
// ============================================================

/// 把打字机输出写到标准输出；出现最终结果或错误时发出完成信号
pub struct TerminalPresenter {
    printed: String,
    done: watch::Sender<bool>,
}

impl TerminalPresenter {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (done, rx) = watch::channel(false);
        (
            Self {
                printed: String::new(),
                done,
            },
            rx,
        )
    }

    fn finish_line(&mut self, out: &mut impl Write) {
        if !self.printed.is_empty() {
            let _ = writeln!(out);
            self.printed.clear();
        }
    }
}

impl OverlayPresenter for TerminalPresenter {
    fn show(&mut self, _position: Point) {
        self.printed.clear();
    }

    fn hide(&mut self) {
        let mut out = std::io::stdout();
        self.finish_line(&mut out);
    }

    fn render(&mut self, view: &PanelView) {
        let mut out = std::io::stdout();
        match view {
            PanelView::Hidden => {}
            PanelView::Loading { streaming } => {
                let _ = writeln!(
                    out,
                    "⏳ {}",
                    if *streaming { "AI 翻译中..." } else { "翻译中..." }
                );
            }
            PanelView::Streaming { text } => {
                match text.strip_prefix(self.printed.as_str()) {
                    Some(delta) => {
                        let _ = write!(out, "{}", delta);
                    }
                    None => {
                        let _ = write!(out, "\r{}", text);
                    }
                }
                self.printed = text.clone();
            }
            PanelView::Final {
                text,
                pronunciation,
            } => {
                self.finish_line(&mut out);
                let _ = writeln!(out, "✅ {}", text);
                if let Some(p) = pronunciation {
                    let _ = writeln!(out, "   [{}]", p);
                }
                let _ = self.done.send(true);
            }
            PanelView::Error { message } => {
                self.finish_line(&mut out);
                let _ = writeln!(out, "❌ {}", message);
                let _ = self.done.send(true);
            }
        }
        let _ = out.flush();
    }

    fn bounding_box(&self) -> Rect {
        Rect::default()
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            width: f64::MAX,
            height: f64::MAX,
        }
    }

    fn move_to(&mut self, _position: Point) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_presenter_grows_with_text() {
        let (mut presenter, probe) = MemoryPresenter::new(Viewport {
            width: 800.0,
            height: 600.0,
        });
        presenter.show(Point::new(10.0, 10.0));
        let before = presenter.bounding_box().size.height;
        presenter.render(&PanelView::Streaming {
            text: "x".repeat(100),
        });
        assert!(presenter.bounding_box().size.height > before);
        assert!(probe.is_visible());
        assert_eq!(probe.streamed_texts(), vec!["x".repeat(100)]);

        presenter.hide();
        assert!(!probe.is_visible());
        assert_eq!(probe.last_view(), Some(PanelView::Hidden));
    }

    #[tokio::test]
    async fn test_terminal_presenter_signals_done() {
        let (mut presenter, mut done) = TerminalPresenter::new();
        presenter.render(&PanelView::Streaming { text: "Hi".into() });
        assert!(!*done.borrow());
        presenter.render(&PanelView::Final {
            text: "Hi".into(),
            pronunciation: None,
        });
        done.changed().await.unwrap();
        assert!(*done.borrow());
    }
}
