//! Clerk webhook receiver.
//!
//! `POST /api/v1/webhooks/clerk` is public; authenticity comes from the SVIX
//! signature over the raw body, so the body is taken as bytes and only parsed
//! after verification.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use crate::{
    error::AppError,
    models::{clerk::ClerkEnvelope, webhook_event::WebhookAck},
    services::webhook_processor,
    state::AppState,
};

/// Receive a Clerk webhook delivery.
///
/// # Flow
///
/// 1. Verify `svix-id` / `svix-timestamp` / `svix-signature` against the raw body
/// 2. Parse the event envelope
/// 3. Record the event; a repeated `svix-id` is acknowledged as a duplicate
/// 4. Spawn processing and acknowledge immediately
///
/// # Response
///
/// - **200**: `{"status": "accepted", "event_id": "..."}` or `{"status": "duplicate"}`
/// - **400**: body is not a Clerk event envelope
/// - **401**: signature verification failed
///
/// Clerk retries non-2xx responses, so nothing after recording can fail the request.
pub async fn receive_clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let delivery = state.verifier.verify(&headers, &body)?;

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidRequest(format!("Malformed JSON body: {e}")))?;
    let envelope: ClerkEnvelope = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::InvalidRequest(format!("Not a Clerk event: {e}")))?;

    let Some(event) = webhook_processor::record_event(
        &state.pool,
        &delivery.message_id,
        &envelope.event_type,
        &payload,
    )
    .await?
    else {
        tracing::info!(svix_id = %delivery.message_id, "Duplicate Clerk delivery ignored");
        return Ok(Json(WebhookAck::duplicate()));
    };

    tracing::info!(
        event_id = %event.id,
        svix_id = %event.svix_id,
        event_type = %event.event_type,
        "Clerk webhook accepted"
    );

    webhook_processor::spawn_processing(state.pool.clone(), event.id, state.retry_policy);

    Ok(Json(WebhookAck::accepted(event.id)))
}
