// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Authorization-Gated Dispatcher
//!
//! Turns one [`CallEnvelope`] into exactly one [`ResultEnvelope`].
//!
//! ## Pipeline
//!
//! With the default [`DispatchOrder::ExistenceFirst`]:
//!
//! 1. resolve the name in the registry (kind must match) → `CapabilityNotFound`
//! 2. validate arguments against the input schema → `InvalidArguments`
//! 3. ask the [`PermissionPolicy`] → `PermissionDenied`
//! 4. run the handler → success, or `HandlerFailure`
//!
//! [`DispatchOrder::DenyFirst`] moves step 3 to the front so callers cannot
//! learn which capabilities exist by trying names they may not invoke.
//!
//! A resource read that resolves through a URI template is authorized against
//! the template (`greeting://{name}`), with the extracted variables merged
//! into the arguments before validation.
//!
//! The dispatcher holds no per-session state; it only reads the
//! [`AuthorizationContext`] it is handed.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};

use crate::domain::authorization::AuthorizationContext;
use crate::domain::capability::{CapabilityDescriptor, CapabilityKind, CapabilitySummary};
use crate::domain::envelope::{CallEnvelope, DispatchError, ResultEnvelope};
use crate::domain::gateway_config::{DispatchOrder, ListingPolicy};
use crate::domain::permission::PermissionPolicy;
use crate::infrastructure::registry::{CapabilityRegistry, Resolution};

pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    policy: Arc<dyn PermissionPolicy>,
    order: DispatchOrder,
    listing: ListingPolicy,
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, policy: Arc<dyn PermissionPolicy>) -> Self {
        Self {
            registry,
            policy,
            order: DispatchOrder::default(),
            listing: ListingPolicy::default(),
        }
    }

    pub fn with_order(mut self, order: DispatchOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_listing(mut self, listing: ListingPolicy) -> Self {
        self.listing = listing;
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub async fn dispatch(&self, call: CallEnvelope, context: &AuthorizationContext) -> ResultEnvelope {
        let CallEnvelope {
            correlation_id,
            kind,
            capability,
            arguments,
        } = call;

        match self.run(kind, &capability, arguments, context).await {
            Ok(value) => ResultEnvelope::success(correlation_id, value),
            Err(error) => ResultEnvelope::error(correlation_id, error),
        }
    }

    /// Capabilities of `kind` visible to the caller under the listing policy.
    /// Resource templates are listed separately.
    pub fn list_capabilities(&self, kind: CapabilityKind, context: &AuthorizationContext) -> Vec<CapabilitySummary> {
        self.registry
            .list(kind)
            .filter(|descriptor| !descriptor.is_template() && self.is_listed(descriptor, context))
            .map(CapabilityDescriptor::summary)
            .collect()
    }

    pub fn list_resource_templates(&self, context: &AuthorizationContext) -> Vec<CapabilitySummary> {
        self.registry
            .list(CapabilityKind::Resource)
            .filter(|descriptor| descriptor.is_template() && self.is_listed(descriptor, context))
            .map(CapabilityDescriptor::summary)
            .collect()
    }

    fn is_listed(&self, descriptor: &CapabilityDescriptor, context: &AuthorizationContext) -> bool {
        match self.listing {
            ListingPolicy::All => true,
            ListingPolicy::Permitted => self
                .policy
                .authorize(context.credential(), &descriptor.name)
                .is_allowed(),
        }
    }

    async fn run(
        &self,
        kind: CapabilityKind,
        name: &str,
        arguments: Value,
        context: &AuthorizationContext,
    ) -> Result<Value, DispatchError> {
        let resolution = self.registry.resolve(kind, name);
        let permission_name = resolution
            .as_ref()
            .map(|resolved| resolved.entry)
            .map_or(name, |entry| entry.descriptor().name.as_str());

        if self.order == DispatchOrder::DenyFirst {
            self.authorize(context, permission_name, name)?;
        }

        let Some(Resolution { entry, variables }) = resolution else {
            return Err(DispatchError::CapabilityNotFound {
                kind,
                name: name.to_string(),
            });
        };

        let arguments = bind_variables(arguments, variables);
        entry.validate_arguments(&arguments)?;

        if self.order == DispatchOrder::ExistenceFirst {
            self.authorize(context, permission_name, name)?;
        }

        execute(entry.descriptor(), arguments, context).await
    }

    /// Check `permission_name`; a denial reports the name the caller asked for.
    fn authorize(
        &self,
        context: &AuthorizationContext,
        permission_name: &str,
        requested: &str,
    ) -> Result<(), DispatchError> {
        self.policy
            .authorize(context.credential(), permission_name)
            .into_result()
            .map_err(|_| DispatchError::PermissionDenied {
                name: requested.to_string(),
            })
    }
}

fn bind_variables(arguments: Value, variables: Map<String, Value>) -> Value {
    if variables.is_empty() {
        return arguments;
    }
    let mut object = match arguments {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.extend(variables);
    Value::Object(object)
}

async fn execute(
    descriptor: &CapabilityDescriptor,
    arguments: Value,
    context: &AuthorizationContext,
) -> Result<Value, DispatchError> {
    let invocation = descriptor.handler.invoke(arguments, context);

    match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(DispatchError::HandlerFailure {
            message: format!("{error:#}"),
        }),
        Err(panic) => Err(DispatchError::HandlerFailure {
            message: format!("handler panicked: {}", panic_message(panic.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
