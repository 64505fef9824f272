use axum::http::header;
use axum::response::{Html, IntoResponse};

pub const API_DOCS_PATH: &str = "/api-docs";

const OPENAPI_DESCRIPTOR: &str = include_str!("openapi.yaml");

const SWAGGER_UI_PAGE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>URL relay API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: "/api-docs/openapi.yaml", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>
"##;

/// Interactive documentation page
pub async fn api_docs() -> Html<&'static str> {
    Html(SWAGGER_UI_PAGE)
}

/// The static OpenAPI descriptor the docs page renders
pub async fn openapi_descriptor() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        OPENAPI_DESCRIPTOR,
    )
}
