//! 交互层入口。
//!
//! 只有一套基于标准输入输出的行式交互（`noui`）。

pub mod noui;
