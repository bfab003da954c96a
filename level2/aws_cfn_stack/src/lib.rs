use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod client;
mod error;

pub use error::StackError;

/// anything that can be written into the `Resources` section of a template.
pub trait CfnResource: Send + Sync {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
    fn deletion_policy(&self) -> Option<&'static str> {
        None
    }
}

pub struct Resource {
    pub name: String,
    pub properties: Box<dyn CfnResource>,
}

impl Resource {
    pub fn new<R: CfnResource + 'static>(name: impl Into<String>, properties: R) -> Self {
        Self {
            name: name.into(),
            properties: Box::new(properties),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: "2010-09-09".to_string(),
            description: Default::default(),
            parameters: Default::default(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.ty == ty)
            .map(|(name, _)| name.as_str())
    }
}

/// everything needed to build one stack's template.
#[derive(Default)]
pub struct Input {
    pub description: String,
    pub resources: Vec<Resource>,
    /// (name, description) of each string parameter the template takes.
    pub parameters: Vec<(String, String)>,
    /// (name, description, value) of each stack output.
    pub outputs: Vec<(String, String, Value)>,
}

impl Input {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn resource<R: CfnResource + 'static>(&mut self, name: &str, properties: R) -> &mut Self {
        self.resources.push(Resource::new(name, properties));
        self
    }

    pub fn parameter(&mut self, name: &str, description: &str) -> &mut Self {
        self.parameters.push((name.to_string(), description.to_string()));
        self
    }

    pub fn output(&mut self, name: &str, description: &str, value: Value) -> &mut Self {
        self.outputs.push((name.to_string(), description.to_string(), value));
        self
    }

    pub fn into_template(self) -> Result<SavedTemplate, StackError> {
        let mut out_template = validate_resources_to_template(&self.resources)?;
        out_template.description = self.description;
        for (name, description) in self.parameters {
            verify_resource_name(&name).map_err(|message| StackError::InvalidResource { name: name.clone(), message })?;
            out_template.parameters.insert(name, TemplateParameter { ty: "String".to_string(), description });
        }
        for (name, description, value) in self.outputs {
            verify_resource_name(&name).map_err(|message| StackError::InvalidResource { name: name.clone(), message })?;
            out_template.outputs.insert(name, ResourceOutput { description, value });
        }
        Ok(out_template)
    }
}

fn validate_resources_to_template(resources: &[Resource]) -> Result<SavedTemplate, StackError> {
    let mut out_template = SavedTemplate::default();
    for resource in resources.iter() {
        if let Err(message) = verify_resource_name(&resource.name) {
            return Err(StackError::InvalidResource { name: resource.name.clone(), message });
        }
        if let Err(message) = resource.properties.validate() {
            return Err(StackError::InvalidResource { name: resource.name.clone(), message });
        }
        if out_template.resources.contains_key(&resource.name) {
            return Err(StackError::InvalidResource {
                name: resource.name.clone(),
                message: "Duplicate logical id".to_string(),
            });
        }
        let saved_resource = SavedResource {
            ty: resource.properties.type_string().to_string(),
            properties: resource.properties.properties(),
            deletion_policy: resource.properties.deletion_policy().map(str::to_string),
        };
        out_template.resources.insert(resource.name.clone(), saved_resource);
    }
    Ok(out_template)
}

/// a template bound to a stack name, a region and the parameter values for one deploy.
#[derive(Debug, Clone, PartialEq)]
pub struct StackSpec {
    pub name: String,
    pub region: String,
    pub template: SavedTemplate,
    pub parameters: BTreeMap<String, String>,
}

impl StackSpec {
    pub fn new(name: &str, region: &str, template: SavedTemplate) -> Result<Self, StackError> {
        let name = validate_stack_name(name)?;
        Ok(Self {
            name,
            region: region.to_string(),
            template,
            parameters: BTreeMap::new(),
        })
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn missing_parameters(&self) -> Vec<String> {
        self.template
            .parameters
            .keys()
            .filter(|k| !self.parameters.contains_key(*k))
            .cloned()
            .collect()
    }

    /// we make it pretty so if a user needs to look at the stack in the Cfn console, it looks nice
    pub fn template_body(&self) -> Result<String, StackError> {
        serde_json::to_string_pretty(&self.template).map_err(|source| StackError::Serialize {
            stack: self.name.clone(),
            source,
        })
    }
}

pub fn validate_stack_name(stack_name: &str) -> Result<String, StackError> {
    // A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
    // It must start with an alphabetical character and can't be longer than 128 characters.
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || StackError::InvalidName { name: stack_name.to_string(), restriction };
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if stack_name.chars().any(|c| !c.is_ascii_alphanumeric() && c != '-') {
        return Err(invalid());
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    Ok(stack_name.to_string())
}

pub fn verify_resource_name(resource_name: &str) -> Result<(), String> {
    if resource_name.len() > 255 {
        return Err(format!("Invalid resource name {:?}\nmust be less than 255 characters", resource_name));
    }
    if resource_name.is_empty() {
        return Err(format!("Invalid resource name {:?}\nMust contain at least 1 character", resource_name));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", resource_name));
    }
    Ok(())
}

pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// `WebsiteURL` of an S3 bucket is `http://host`; cloudfront wants only the host:
/// { "Fn::Select" : [ "2", { "Fn::Split": ["/", { "Fn::GetAtt": [bucket, "WebsiteURL"] }] } ] }
pub fn select_s3website_host(logical_bucket: &str) -> Value {
    json!({ "Fn::Select": ["2", { "Fn::Split": ["/", get_att(logical_bucket, "WebsiteURL")] }] })
}
