// rust_websocket_utils/src/server/mod.rs

//! WebSocket 服务端模块。
//!
//! 本模块负责：
//! - **服务器启动与监听**: 在指定地址上接受 TCP 连接并完成 WebSocket 握手。
//! - **连接拆分**: 把每个连接拆成发送端 `ConnectionHandler` 与接收流，交给上层回调。
//! - **逐帧接收**: `receive_message` 把底层帧转换为 `WsMessage`，并把关闭事件表示为 `None`。

pub mod transport;
