/// 划词翻译浮窗
///
/// - `typewriter`: 打字机渲染器（固定节拍显示，独占渲染状态）
/// - `content`: 标签页一侧的消息处理与请求代际管理
/// - `presenter` / `geometry`: 浮窗接口与定位
pub mod content;
pub mod geometry;
pub mod presenter;
pub mod typewriter;

pub use content::{ContentScript, SelectionOutcome};
pub use geometry::{Point, Rect, Size, Viewport};
pub use presenter::{MemoryPresenter, OverlayPresenter, PanelView, PresenterProbe, TerminalPresenter};
pub use typewriter::{RenderPhase, RenderState, TypewriterConfig, TypewriterHandle};
