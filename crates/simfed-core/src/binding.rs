//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Declarative attribute and interaction binding tables."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::collections::HashMap;

use bytes::Bytes;
use indexmap::IndexMap;
use simfed_common::{InteractionConfig, ObjectClassConfig, SchemaConfig, ValueType};

use crate::codec::{self, ScalarValue};
use crate::error::{FederateError, Result};
use crate::registry::HandleRegistry;
use crate::rti::{Handle, HandleCategory};

/// One named, typed field bound to its federation handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBinding {
    name: String,
    handle: Handle,
    value_type: ValueType,
}

pub type AttributeBinding = ValueBinding;
pub type ParameterBinding = ValueBinding;

impl ValueBinding {
    pub fn new(name: impl Into<String>, handle: Handle, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            handle,
            value_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn encode(&self, value: &ScalarValue) -> Result<Bytes> {
        codec::encode(self.value_type, value).map_err(|source| FederateError::Encode {
            name: self.name.clone(),
            source,
        })
    }

    pub fn decode(&self, raw: &[u8]) -> Result<ScalarValue> {
        codec::decode(self.value_type, raw).map_err(|source| FederateError::Decode {
            name: self.name.clone(),
            source,
        })
    }
}

/// Fields of one class in declaration order, addressable by name or handle.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    by_name: IndexMap<String, ValueBinding>,
    by_handle: HashMap<Handle, usize>,
}

impl BindingTable {
    fn build(
        fields: &IndexMap<String, ValueType>,
        category: HandleCategory,
        registry: &HandleRegistry,
    ) -> Result<Self> {
        let mut table = Self::default();
        for (name, value_type) in fields {
            let handle = registry.resolve(category, name)?;
            let index = table.by_name.len();
            table
                .by_name
                .insert(name.clone(), ValueBinding::new(name, handle, *value_type));
            table.by_handle.insert(handle, index);
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&ValueBinding> {
        self.by_name.get(name)
    }

    pub fn by_handle(&self, handle: Handle) -> Option<&ValueBinding> {
        self.by_handle
            .get(&handle)
            .and_then(|index| self.by_name.get_index(*index))
            .map(|(_, binding)| binding)
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.by_name.values().map(ValueBinding::handle).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValueBinding> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// The object class this federate publishes and its attribute table.
#[derive(Debug, Clone)]
pub struct ObjectClassBinding {
    name: String,
    handle: Handle,
    subscribe: bool,
    attributes: BindingTable,
}

impl ObjectClassBinding {
    pub fn from_config(config: &ObjectClassConfig, registry: &HandleRegistry) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            handle: registry.resolve(HandleCategory::ObjectClass, &config.name)?,
            subscribe: config.subscribe,
            attributes: BindingTable::build(
                &config.attributes,
                HandleCategory::Attribute,
                registry,
            )?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn subscribe(&self) -> bool {
        self.subscribe
    }

    pub fn attributes(&self) -> &BindingTable {
        &self.attributes
    }
}

#[derive(Debug, Clone)]
pub struct InteractionBinding {
    name: String,
    handle: Handle,
    publish: bool,
    subscribe: bool,
    parameters: BindingTable,
}

impl InteractionBinding {
    pub fn from_config(
        name: &str,
        config: &InteractionConfig,
        registry: &HandleRegistry,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_owned(),
            handle: registry.resolve(HandleCategory::InteractionClass, name)?,
            publish: config.publish,
            subscribe: config.subscribe,
            parameters: BindingTable::build(
                &config.parameters,
                HandleCategory::Parameter,
                registry,
            )?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn publish(&self) -> bool {
        self.publish
    }

    pub fn subscribe(&self) -> bool {
        self.subscribe
    }

    pub fn parameters(&self) -> &BindingTable {
        &self.parameters
    }
}

/// Every binding the schema declares, built once after handle resolution.
#[derive(Debug, Clone)]
pub struct SchemaBindings {
    pub object_class: ObjectClassBinding,
    pub interactions: IndexMap<String, InteractionBinding>,
}

impl SchemaBindings {
    pub fn build(schema: &SchemaConfig, registry: &HandleRegistry) -> Result<Self> {
        let object_class = ObjectClassBinding::from_config(&schema.object_class, registry)?;
        let interactions = schema
            .interactions
            .iter()
            .map(|(name, config)| {
                InteractionBinding::from_config(name, config, registry)
                    .map(|binding| (name.clone(), binding))
            })
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(Self {
            object_class,
            interactions,
        })
    }
}
