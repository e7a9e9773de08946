//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて再投入の仕組みを実装します。
//!
//! # 主要コンポーネント
//! - **RetryController**: report / retry / delete の 3 エンドポイントとライフサイクル
//! - **RetryDispatcher**: 単一ワーカーによる FIFO の再投入
//! - **HttpListener**: prefix ごとにハンドラを登録できる HTTP バインディング
//! - **ReportBuilder**: 一覧のレンダリング
//! - **RouteMatcher**: メソッドとパスの判定

pub mod controller;
pub mod dispatcher;
pub mod http;
pub mod report;
pub mod route;

// 主要な型を再エクスポート
pub use self::controller::{BuildError, RetryController, RetryControllerBuilder};
pub use self::dispatcher::RetryDispatcher;
pub use self::http::{HttpListener, HttpReply, RequestHandler, ResponseWriter};
pub use self::report::ReportBuilder;
pub use self::route::{RouteMatch, RouteMatcher};
