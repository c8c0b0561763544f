//! Renders resource definitions as Pulumi YAML programs.

use crate::definition::{self, ResourceDefinition, SiteDefinition, VmDefinition};
use serde_json::{json, Value};

const AMI_OWNER: &str = "amazon";
const AMI_NAME_FILTER: &str = "*amzn2-ami-minimal-hvm*";

/// Contents of `Pulumi.yaml` for `project` declaring `definition`.
pub fn render(project: &str, definition: &ResourceDefinition) -> anyhow::Result<String> {
    let mut program = json!({
        "name": project,
        "runtime": "yaml",
        "description": "Managed by platyform",
    });
    let body = match definition {
        ResourceDefinition::Empty => None,
        ResourceDefinition::Site(site) => Some(site_program(site)),
        ResourceDefinition::VirtualMachine(vm) => Some(vm_program(vm)),
    };
    if let (Some(Value::Object(body)), Value::Object(program)) = (body, &mut program) {
        program.extend(body);
    }
    Ok(serde_yaml_ng::to_string(&program)?)
}

/// Pulumi YAML interpolates `${...}` in every string; `$${` is its escape for a literal `${`.
fn literal(s: &str) -> String {
    s.replace("${", "$${")
}

fn site_program(site: &SiteDefinition) -> Value {
    let content = literal(&site.content);
    json!({
        "resources": {
            "s3-website-bucket": {
                "type": "aws:s3:Bucket",
                "properties": {
                    "website": { "indexDocument": definition::INDEX_DOCUMENT },
                },
            },
            "index": {
                "type": "aws:s3:BucketObject",
                "properties": {
                    "bucket": "${s3-website-bucket.id}",
                    "content": content,
                    "key": definition::INDEX_DOCUMENT,
                    "contentType": definition::INDEX_CONTENT_TYPE,
                },
            },
            "bucket-policy": {
                "type": "aws:s3:BucketPolicy",
                "properties": {
                    "bucket": "${s3-website-bucket.id}",
                    "policy": {
                        "fn::toJSON": {
                            "Version": "2012-10-17",
                            "Statement": {
                                "Effect": "Allow",
                                "Principal": "*",
                                "Action": ["s3:GetObject"],
                                "Resource": ["arn:aws:s3:::${s3-website-bucket.id}/*"],
                            },
                        },
                    },
                },
            },
        },
        "outputs": {
            (definition::WEBSITE_URL): "${s3-website-bucket.websiteEndpoint}",
            (definition::WEBSITE_CONTENT): content,
        },
    })
}

fn vm_program(vm: &VmDefinition) -> Value {
    json!({
        "variables": {
            "ami": {
                "fn::invoke": {
                    "function": "aws:ec2:getAmi",
                    "arguments": {
                        "mostRecent": true,
                        "owners": [AMI_OWNER],
                        "filters": [{ "name": "name", "values": [AMI_NAME_FILTER] }],
                    },
                    "return": "id",
                },
            },
        },
        "resources": {
            "web-secgrp": {
                "type": "aws:ec2:SecurityGroup",
                "properties": {
                    "description": "Enable SSH access",
                    "ingress": [{
                        "protocol": "tcp",
                        "fromPort": definition::SSH_PORT,
                        "toPort": definition::SSH_PORT,
                        "cidrBlocks": ["0.0.0.0/0"],
                    }],
                },
            },
            "dlami-keypair": {
                "type": "aws:ec2:KeyPair",
                "properties": { "publicKey": literal(&vm.public_key) },
            },
            "dlami-server": {
                "type": "aws:ec2:Instance",
                "properties": {
                    "instanceType": vm.instance_type.as_str(),
                    "vpcSecurityGroupIds": ["${web-secgrp.id}"],
                    "keyName": "${dlami-keypair.id}",
                    "ami": "${ami}",
                },
            },
        },
        "outputs": {
            (definition::INSTANCE_TYPE): "${dlami-server.instanceType}",
            (definition::PUBLIC_KEY): "${dlami-keypair.publicKey}",
            (definition::PUBLIC_IP): "${dlami-server.publicIp}",
            (definition::PUBLIC_DNS): "${dlami-server.publicDns}",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance_type::InstanceType;

    fn parse(yaml: &str) -> Value {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn empty_definition_declares_only_the_project() {
        let program = parse(&render("proj", &ResourceDefinition::Empty).unwrap());
        assert_eq!(program["name"], "proj");
        assert_eq!(program["runtime"], "yaml");
        assert!(program.get("resources").is_none());
        assert!(program.get("outputs").is_none());
    }

    #[test]
    fn site_serves_content_as_public_index() {
        let definition = ResourceDefinition::Site(SiteDefinition { content: "<h1>hi</h1>".to_owned() });
        let program = parse(&render("proj", &definition).unwrap());

        let index = &program["resources"]["index"]["properties"];
        assert_eq!(index["content"], "<h1>hi</h1>");
        assert_eq!(index["key"], "index.html");
        assert_eq!(index["contentType"], "text/html; charset=utf-8");
        assert_eq!(program["resources"]["s3-website-bucket"]["properties"]["website"]["indexDocument"], "index.html");

        let statement = &program["resources"]["bucket-policy"]["properties"]["policy"]["fn::toJSON"]["Statement"];
        assert_eq!(statement["Principal"], "*");
        assert_eq!(statement["Resource"][0], "arn:aws:s3:::${s3-website-bucket.id}/*");
        assert_eq!(program["outputs"]["website_content"], "<h1>hi</h1>");
    }

    #[test]
    fn site_content_is_not_interpolated() {
        let definition = ResourceDefinition::Site(SiteDefinition { content: "price: ${amount}".to_owned() });
        let program = parse(&render("proj", &definition).unwrap());
        assert_eq!(program["resources"]["index"]["properties"]["content"], "price: $${amount}");
    }

    #[test]
    fn vm_opens_ssh_and_uses_minimal_amazon_linux() {
        let vm = VmDefinition { public_key: "ssh-ed25519 AAAA".to_owned(), instance_type: InstanceType::P32xlarge };
        let program = parse(&render("proj", &ResourceDefinition::VirtualMachine(vm)).unwrap());

        let ingress = &program["resources"]["web-secgrp"]["properties"]["ingress"][0];
        assert_eq!(ingress["fromPort"], 22);
        assert_eq!(ingress["toPort"], 22);
        assert_eq!(ingress["cidrBlocks"][0], "0.0.0.0/0");

        let invoke = &program["variables"]["ami"]["fn::invoke"];
        assert_eq!(invoke["arguments"]["owners"][0], "amazon");
        assert_eq!(invoke["arguments"]["filters"][0]["values"][0], "*amzn2-ami-minimal-hvm*");

        assert_eq!(program["resources"]["dlami-server"]["properties"]["instanceType"], "p3.2xlarge");
        assert_eq!(program["resources"]["dlami-keypair"]["properties"]["publicKey"], "ssh-ed25519 AAAA");
        let outputs = program["outputs"].as_object().unwrap();
        assert_eq!(outputs.len(), 4);
    }
}
