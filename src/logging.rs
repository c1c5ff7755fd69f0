// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros for consistent field names and message patterns across the application
///
/// These macros ensure:
/// - Consistent field naming conventions
/// - Appropriate logging levels for different scenarios
/// - Structured logging with context

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, roadmap_id = $roadmap_id:expr, user_id = $user_id:expr) => {
        tracing::debug!(
            operation = $operation,
            roadmap_id = %$roadmap_id,
            user_id = %$user_id,
            "API operation started"
        );
    };
    ($operation:expr, roadmap_id = $roadmap_id:expr) => {
        tracing::debug!(
            operation = $operation,
            roadmap_id = %$roadmap_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, roadmap_id = $roadmap_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            roadmap_id = %$roadmap_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, roadmap_id = $roadmap_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            roadmap_id = %$roadmap_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, roadmap_id = $roadmap_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            roadmap_id = %$roadmap_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

/// Log service operation start with context
#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, roadmap_id = $roadmap_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            roadmap_id = %$roadmap_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr, topic = $topic:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            topic = %$topic,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation started"
        );
    };
}

/// Log service operation success
#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, roadmap_id = $roadmap_id:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            roadmap_id = %$roadmap_id,
            duration_ms = $duration,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

/// Log service warnings
#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Database Operation Logging Macros
// ============================================================================

/// Log database operation performance and results
#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, roadmap_id = $roadmap_id:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            roadmap_id = %$roadmap_id,
            duration_ms = $duration,
            "Database operation completed"
        );
    };
    (debug, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            duration_ms = $duration,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "database",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
}

// ============================================================================
// LLM Service Logging Macros
// ============================================================================

/// Log LLM service operations with provider context
#[macro_export]
macro_rules! log_llm_operation {
    (start, $operation:expr, provider = $provider:expr, attempt = $attempt:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            attempt = $attempt,
            "LLM operation started"
        );
    };
    (success, $operation:expr, provider = $provider:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            duration_ms = $duration,
            "LLM operation completed successfully"
        );
    };
    (error, $operation:expr, provider = $provider:expr, error = $error:expr, retry_count = $retry:expr) => {
        tracing::error!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            error = %$error,
            retry_count = $retry,
            "LLM operation failed"
        );
    };
    (warn, $operation:expr, $msg:expr) => {
        tracing::warn!(
            component = "llm_service",
            operation = $operation,
            "LLM operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Timeline Logging Macros
// ============================================================================

/// Log linearizer decisions: severed cycles and the shape of the result
#[macro_export]
macro_rules! log_timeline_event {
    (cycle_broken, item = $item:expr, prerequisite = $prerequisite:expr) => {
        tracing::warn!(
            component = "timeline",
            item_id = %$item,
            prerequisite_id = %$prerequisite,
            "Prerequisite cycle detected, dropping back-edge"
        );
    };
    (generated, weeks = $weeks:expr, broken_edges = $broken:expr, dangling = $dangling:expr) => {
        tracing::debug!(
            component = "timeline",
            week_count = $weeks,
            broken_edges = $broken,
            dangling_references = $dangling,
            "Timeline generated"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
