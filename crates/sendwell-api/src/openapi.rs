//! OpenAPI documentation
//!
//! Serves a hand-maintained OpenAPI 3.0 document and a Swagger UI page.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(get_openapi_spec())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

fn schema_ref(name: &str) -> Value {
    json!({"$ref": format!("#/components/schemas/{}", name)})
}

fn json_response(description: &str, schema: Value) -> Value {
    json!({
        "description": description,
        "content": {"application/json": {"schema": schema}}
    })
}

fn campaign_id_param() -> Value {
    json!({
        "name": "campaign_id",
        "in": "path",
        "required": true,
        "schema": {"type": "string", "format": "uuid"}
    })
}

/// A POST that moves a campaign through its lifecycle
fn campaign_action(operation_id: &str, summary: &str) -> Value {
    json!({
        "post": {
            "tags": ["campaigns"],
            "summary": summary,
            "operationId": operation_id,
            "parameters": [campaign_id_param()],
            "responses": {
                "200": json_response("Updated campaign", schema_ref("Campaign")),
                "404": json_response("Campaign not found", schema_ref("ErrorResponse")),
                "409": json_response("Action not allowed in the current status", schema_ref("ErrorResponse")),
                "422": json_response("Campaign failed validation", schema_ref("ErrorResponse"))
            }
        }
    })
}

/// Get the OpenAPI specification as JSON
fn get_openapi_spec() -> Value {
    let mut paths = json!({
        "/health": {
            "get": {
                "tags": ["health"],
                "summary": "Basic health check",
                "operationId": "health",
                "responses": {
                    "200": json_response("Service is healthy", schema_ref("HealthResponse"))
                }
            }
        },
        "/health/live": {
            "get": {
                "tags": ["health"],
                "summary": "Liveness check",
                "operationId": "liveness",
                "responses": {"200": {"description": "Service is alive"}}
            }
        },
        "/health/ready": {
            "get": {
                "tags": ["health"],
                "summary": "Readiness check",
                "operationId": "readiness",
                "responses": {
                    "200": {"description": "Store is reachable"},
                    "503": {"description": "Store is unavailable"}
                }
            }
        },
        "/health/detailed": {
            "get": {
                "tags": ["health"],
                "summary": "Component health",
                "operationId": "healthDetailed",
                "responses": {
                    "200": json_response("Detailed health status", schema_ref("DetailedHealthResponse"))
                }
            }
        },
        "/metrics": {
            "get": {
                "tags": ["health"],
                "summary": "Prometheus metrics",
                "operationId": "metrics",
                "responses": {
                    "200": {
                        "description": "Prometheus text exposition",
                        "content": {"text/plain": {"schema": {"type": "string"}}}
                    }
                }
            }
        },
        "/api/v1/webhooks/{provider}": {
            "post": {
                "tags": ["webhooks"],
                "summary": "Receive provider delivery events",
                "description": "Accepts a batch of provider events. Replays are reported as duplicates and never change counters. When a secret is configured for the provider the body must carry an `X-Webhook-Signature: sha256=<hex>` HMAC.",
                "operationId": "receiveWebhook",
                "parameters": [{
                    "name": "provider",
                    "in": "path",
                    "required": true,
                    "schema": {"type": "string", "enum": ["sendgrid", "mailgun", "ses", "generic"]}
                }],
                "requestBody": {
                    "required": true,
                    "content": {"application/json": {"schema": {"type": "object"}}}
                },
                "responses": {
                    "200": json_response("Batch summary", schema_ref("BatchSummary")),
                    "400": json_response("Unknown provider or unreadable body", schema_ref("ErrorResponse")),
                    "401": json_response("Bad signature", schema_ref("ErrorResponse")),
                    "503": json_response("Store unavailable, retry later", schema_ref("ErrorResponse"))
                }
            }
        },
        "/api/v1/campaigns": {
            "get": {
                "tags": ["campaigns"],
                "summary": "List campaigns",
                "operationId": "listCampaigns",
                "parameters": [
                    {"name": "user_id", "in": "query", "schema": {"type": "string", "format": "uuid"}},
                    {"name": "status", "in": "query", "schema": schema_ref("CampaignStatus")},
                    {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 50, "maximum": 500}},
                    {"name": "offset", "in": "query", "schema": {"type": "integer", "default": 0}}
                ],
                "responses": {
                    "200": json_response("Page of campaigns", json!({
                        "type": "object",
                        "properties": {
                            "data": {"type": "array", "items": schema_ref("Campaign")},
                            "total": {"type": "integer"},
                            "limit": {"type": "integer"},
                            "offset": {"type": "integer"}
                        }
                    }))
                }
            },
            "post": {
                "tags": ["campaigns"],
                "summary": "Create a draft campaign",
                "operationId": "createCampaign",
                "requestBody": {
                    "required": true,
                    "content": {"application/json": {"schema": schema_ref("CreateCampaign")}}
                },
                "responses": {
                    "201": json_response("Created campaign", schema_ref("Campaign")),
                    "422": json_response("Invalid input", schema_ref("ErrorResponse"))
                }
            }
        },
        "/api/v1/campaigns/{campaign_id}": {
            "get": {
                "tags": ["campaigns"],
                "summary": "Get a campaign",
                "operationId": "getCampaign",
                "parameters": [campaign_id_param()],
                "responses": {
                    "200": json_response("Campaign", schema_ref("Campaign")),
                    "404": json_response("Campaign not found", schema_ref("ErrorResponse"))
                }
            },
            "delete": {
                "tags": ["campaigns"],
                "summary": "Delete a draft campaign",
                "operationId": "deleteCampaign",
                "parameters": [campaign_id_param()],
                "responses": {
                    "204": {"description": "Deleted"},
                    "404": json_response("Campaign not found", schema_ref("ErrorResponse")),
                    "409": json_response("Only drafts can be deleted", schema_ref("ErrorResponse"))
                }
            }
        },
        "/api/v1/campaigns/{campaign_id}/recipients": {
            "get": {
                "tags": ["campaigns"],
                "summary": "List a campaign's recipients",
                "operationId": "listRecipients",
                "parameters": [
                    campaign_id_param(),
                    {"name": "status", "in": "query", "schema": schema_ref("RecipientStatus")},
                    {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 50}},
                    {"name": "offset", "in": "query", "schema": {"type": "integer", "default": 0}}
                ],
                "responses": {
                    "200": json_response("Page of recipients", json!({
                        "type": "object",
                        "properties": {
                            "data": {"type": "array", "items": schema_ref("CampaignRecipient")},
                            "total": {"type": "integer"},
                            "limit": {"type": "integer"},
                            "offset": {"type": "integer"}
                        }
                    }))
                }
            }
        },
        "/api/v1/campaigns/{campaign_id}/analytics": {
            "get": {
                "tags": ["campaigns"],
                "summary": "Counters and derived rates",
                "operationId": "getCampaignAnalytics",
                "parameters": [campaign_id_param()],
                "responses": {
                    "200": json_response("Campaign analytics", schema_ref("CampaignAnalytics")),
                    "404": json_response("Campaign not found", schema_ref("ErrorResponse"))
                }
            }
        },
        "/api/v1/generate": {
            "post": {
                "tags": ["generation"],
                "summary": "Generate campaign copy",
                "operationId": "generateContent",
                "requestBody": {
                    "required": true,
                    "content": {"application/json": {"schema": schema_ref("GenerationRequest")}}
                },
                "responses": {
                    "200": json_response("Generated content", schema_ref("GeneratedContent")),
                    "422": json_response("Invalid request", schema_ref("ErrorResponse")),
                    "429": json_response("Generation rate limit reached", schema_ref("ErrorResponse")),
                    "502": json_response("Generation service failed", schema_ref("ErrorResponse")),
                    "503": json_response("Generation is disabled", schema_ref("ErrorResponse"))
                }
            }
        }
    });

    let actions = [
        ("schedule", "scheduleCampaign", "Validate and schedule a draft"),
        ("dispatch", "dispatchCampaign", "Resolve the audience and start sending"),
        ("send", "sendCampaign", "Schedule and dispatch immediately"),
        ("pause", "pauseCampaign", "Pause sending"),
        ("resume", "resumeCampaign", "Resume a paused campaign"),
        ("cancel", "cancelCampaign", "Cancel a campaign"),
        ("recompute", "recomputeCampaign", "Rebuild counters from recipient rows"),
    ];
    if let Some(map) = paths.as_object_mut() {
        for (action, operation_id, summary) in actions {
            map.insert(
                format!("/api/v1/campaigns/{{campaign_id}}/{}", action),
                campaign_action(operation_id, summary),
            );
        }
    }
    if let Some(schedule) = paths.pointer_mut("/~1api~1v1~1campaigns~1{campaign_id}~1schedule/post") {
        schedule["requestBody"] = json!({
            "required": false,
            "content": {"application/json": {"schema": {
                "type": "object",
                "properties": {"scheduled_at": {"type": "string", "format": "date-time"}}
            }}}
        });
    }

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Sendwell API",
            "description": "Campaign delivery and engagement tracking",
            "version": env!("CARGO_PKG_VERSION")
        },
        "tags": [
            {"name": "health", "description": "Health and metrics"},
            {"name": "webhooks", "description": "Provider event intake"},
            {"name": "campaigns", "description": "Campaign lifecycle and analytics"},
            {"name": "generation", "description": "AI content generation"}
        ],
        "paths": paths,
        "components": {
            "schemas": {
                "ErrorResponse": {
                    "type": "object",
                    "properties": {
                        "error": {"type": "string", "example": "invalid_transition"},
                        "message": {"type": "string"}
                    }
                },
                "HealthResponse": {
                    "type": "object",
                    "properties": {"status": {"type": "string", "example": "healthy"}}
                },
                "DetailedHealthResponse": {
                    "type": "object",
                    "properties": {
                        "status": {"type": "string"},
                        "checks": {
                            "type": "object",
                            "properties": {
                                "store": schema_ref("ComponentHealth"),
                                "generation": schema_ref("ComponentHealth")
                            }
                        }
                    }
                },
                "ComponentHealth": {
                    "type": "object",
                    "properties": {
                        "status": {"type": "string", "enum": ["healthy", "unhealthy", "disabled"]},
                        "backend": {"type": "string"},
                        "latency_ms": {"type": "integer"},
                        "error": {"type": "string"}
                    }
                },
                "CampaignStatus": {
                    "type": "string",
                    "enum": ["draft", "scheduled", "sending", "paused", "sent", "cancelled"]
                },
                "RecipientStatus": {
                    "type": "string",
                    "enum": ["pending", "sent", "delivered", "opened", "clicked", "bounced", "unsubscribed"]
                },
                "CreateCampaign": {
                    "type": "object",
                    "required": ["user_id", "name"],
                    "properties": {
                        "user_id": {"type": "string", "format": "uuid"},
                        "name": {"type": "string"},
                        "subject": {"type": "string"},
                        "html_body": {"type": "string"},
                        "text_body": {"type": "string"},
                        "from_address": {"type": "string", "format": "email"},
                        "from_name": {"type": "string"},
                        "audience": {"type": "array", "items": {"type": "string", "format": "email"}},
                        "ai_generated": {"type": "boolean", "default": false}
                    }
                },
                "Campaign": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "format": "uuid"},
                        "user_id": {"type": "string", "format": "uuid"},
                        "name": {"type": "string"},
                        "subject": {"type": "string"},
                        "status": schema_ref("CampaignStatus"),
                        "recipient_count": {"type": "integer"},
                        "sent_count": {"type": "integer"},
                        "delivered_count": {"type": "integer"},
                        "opened_count": {"type": "integer"},
                        "clicked_count": {"type": "integer"},
                        "bounced_count": {"type": "integer"},
                        "unsubscribed_count": {"type": "integer"},
                        "counters_dirty": {"type": "boolean"},
                        "scheduled_at": {"type": "string", "format": "date-time"},
                        "started_at": {"type": "string", "format": "date-time"},
                        "sent_at": {"type": "string", "format": "date-time"}
                    }
                },
                "CampaignRecipient": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "format": "uuid"},
                        "campaign_id": {"type": "string", "format": "uuid"},
                        "email": {"type": "string"},
                        "status": schema_ref("RecipientStatus"),
                        "provider_message_id": {"type": "string"},
                        "open_count": {"type": "integer"},
                        "click_count": {"type": "integer"},
                        "bounce_reason": {"type": "string"},
                        "attempts": {"type": "integer"},
                        "last_error": {"type": "string"}
                    }
                },
                "CampaignAnalytics": {
                    "type": "object",
                    "properties": {
                        "campaign_id": {"type": "string", "format": "uuid"},
                        "status": schema_ref("CampaignStatus"),
                        "counters": {"type": "object"},
                        "delivery_rate": {"type": "number"},
                        "open_rate": {"type": "number"},
                        "click_rate": {"type": "number"},
                        "click_to_open_rate": {"type": "number"},
                        "bounce_rate": {"type": "number"},
                        "unsubscribe_rate": {"type": "number"},
                        "progress": {"type": "number"},
                        "counters_dirty": {"type": "boolean"}
                    }
                },
                "BatchSummary": {
                    "type": "object",
                    "properties": {
                        "accepted": {"type": "integer"},
                        "duplicates": {"type": "integer"},
                        "ignored": {"type": "integer"},
                        "rejected": {"type": "integer"}
                    }
                },
                "GenerationRequest": {
                    "type": "object",
                    "required": ["prompt"],
                    "properties": {
                        "prompt": {"type": "string"},
                        "tone": {
                            "type": "string",
                            "enum": ["professional", "casual", "friendly", "formal", "enthusiastic", "urgent"],
                            "default": "professional"
                        },
                        "length": {"type": "string", "enum": ["short", "medium", "long"], "default": "medium"}
                    }
                },
                "GeneratedContent": {
                    "type": "object",
                    "properties": {
                        "content": {"type": "string"},
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                    }
                }
            }
        }
    })
}

/// Swagger UI HTML template
const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sendwell API</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        .swagger-ui .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIBundle.SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spec_lists_campaign_actions() {
        let spec = get_openapi_spec();
        let paths = spec["paths"].as_object().unwrap();
        for action in ["schedule", "dispatch", "send", "pause", "resume", "cancel", "recompute"] {
            let path = format!("/api/v1/campaigns/{{campaign_id}}/{}", action);
            assert!(paths.contains_key(&path), "missing {}", path);
        }
        assert_eq!(
            spec["paths"]["/api/v1/campaigns/{campaign_id}/schedule"]["post"]["requestBody"]["required"],
            false
        );
    }
}
