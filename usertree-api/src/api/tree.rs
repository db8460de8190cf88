//! Hierarchy tree as JSON and as an HTML page
//!
//! Both views rebuild the forest from one directory read per request.

use axum::{
    extract::State,
    response::Html,
    routing::get,
    Json, Router,
};
use usertree_common::db::users;
use usertree_common::tree::{build_forest, render_markup, TreeNode};

use crate::error::ApiResult;
use crate::AppState;

async fn load_forest(state: &AppState) -> ApiResult<Vec<TreeNode>> {
    let all = users::list_users(&state.db).await?;
    Ok(build_forest(&all))
}

/// GET /user-tree
///
/// Nested `{name, children?}` objects, one per root user.
pub async fn user_tree(State(state): State<AppState>) -> ApiResult<Json<Vec<TreeNode>>> {
    Ok(Json(load_forest(&state).await?))
}

/// GET /tree
///
/// Same structure as `/user-tree`, rendered as nested lists
pub async fn tree_page(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let forest = load_forest(&state).await?;
    let markup = render_markup(&forest);

    let build_timestamp = env!("BUILD_TIMESTAMP");
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = env!("GIT_HASH");
    let build_profile = env!("BUILD_PROFILE");

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>User Tree</title>
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #1a1a1a;
            color: #e0e0e0;
            line-height: 1.6;
            margin: 0;
            padding: 20px;
        }}
        h1 {{
            font-size: 26px;
            color: #4a9eff;
            margin-bottom: 20px;
        }}
        ul {{
            list-style: none;
            padding-left: 20px;
            border-left: 1px solid #3a3a3a;
        }}
        li {{
            margin: 4px 0;
        }}
        footer {{
            margin-top: 30px;
            font-size: 12px;
            color: #888;
            font-family: 'Courier New', monospace;
        }}
    </style>
</head>
<body>
    <h1>User Tree</h1>
    <div class="tree">{markup}</div>
    <footer>v{version} [{git_hash}] {build_timestamp} ({build_profile})</footer>
</body>
</html>
"#,
        markup = markup,
        version = version,
        git_hash = git_hash,
        build_timestamp = build_timestamp,
        build_profile = build_profile,
    );

    Ok(Html(html))
}

/// Build tree routes
pub fn tree_routes() -> Router<AppState> {
    Router::new()
        .route("/user-tree", get(user_tree))
        .route("/tree", get(tree_page))
}
