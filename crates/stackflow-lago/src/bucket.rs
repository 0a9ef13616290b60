//! Private S3 bucket the API stores files in

use serde_json::json;
use stackflow_core::{
    Component, ComponentInfo, DeferredValue, OutputPort, ResourceHandle, Result, Spec,
    StackBuilder,
};

pub const TYPE_TAG: &str = "lago:bucket:Bucket";

#[derive(Debug, Clone)]
pub struct BucketArgs {
    /// Role granted full access to the bucket.
    pub role_name: DeferredValue<String>,
}

#[derive(Debug, Clone)]
pub struct Bucket {
    info: ComponentInfo,
    pub bucket: ResourceHandle,
    pub policy: ResourceHandle,
    pub attachment: ResourceHandle,
}

/// Allow `s3:*` on the bucket and every object in it.
fn access_policy(bucket_arn: String) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": "s3:*",
            "Resource": [format!("{}/*", bucket_arn), bucket_arn],
        }],
    })
    .to_string()
}

impl Bucket {
    pub fn new(stack: &mut StackBuilder, name: &str, args: BucketArgs) -> Result<Self> {
        let (info, (bucket, policy, attachment)) = stack.component(TYPE_TAG, name, |stack| {
            let bucket = stack.resource(name, "aws:s3:Bucket", Spec::new().set("acl", "private"))?;

            let document = bucket.output::<String>("arn").map(access_policy);
            let policy = stack.resource(
                &format!("{}-access-policy", name),
                "aws:iam:Policy",
                Spec::new().input("policy", &document),
            )?;

            let attachment = stack.resource(
                &format!("{}-s3-role-policy-attachment", name),
                "aws:iam:RolePolicyAttachment",
                Spec::new()
                    .input("policy_arn", &policy.output::<String>("arn"))
                    .input("role", &args.role_name),
            )?;
            Ok((bucket, policy, attachment))
        })?;

        Ok(Self {
            info,
            bucket,
            policy,
            attachment,
        })
    }

    pub fn bucket_name(&self) -> DeferredValue<String> {
        self.bucket.output("bucket")
    }

    pub fn bucket_arn(&self) -> DeferredValue<String> {
        self.bucket.output("arn")
    }
}

impl Component for Bucket {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::of("bucket_name", &self.bucket_name()),
            OutputPort::of("bucket_arn", &self.bucket_arn()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_access_policy_covers_bucket_and_objects() {
        let document: Value =
            serde_json::from_str(&access_policy("arn:aws:s3:::lago-bucket".to_string())).unwrap();
        let resources = document["Statement"][0]["Resource"].as_array().unwrap();
        assert_eq!(resources[0], "arn:aws:s3:::lago-bucket/*");
        assert_eq!(resources[1], "arn:aws:s3:::lago-bucket");
        assert_eq!(document["Statement"][0]["Action"], "s3:*");
    }
}
