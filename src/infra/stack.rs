//! CloudFormation template for the URL feed stack.
//!
//! Resources:
//! - `UrlFeedBucket` — feed objects, EventBridge notifications on, optional KMS
//! - `UrlFeedBucketParam` — JSON `FeedLocation` pointing at the bucket
//! - `RetrieveUrlFeedLambdaRole` — basic execution + read grants
//! - `RetrieveUrlFeedLambda` — the function, `provided.al2023`
//! - `RestApi` with a single `GET /feed` method, deployed to `prod`

use serde_json::{Map, Value, json};

use crate::{
    infra::context::DeploymentContext, models::feed_location::FeedLocation,
    services::feed_service::BUCKET_PARAM_ENV,
};

pub const STAGE_NAME: &str = "prod";
pub const FUNCTION_TIMEOUT_SECS: u32 = 60;
pub const LOG_RETENTION_DAYS: u32 = 7;

const BUCKET: &str = "UrlFeedBucket";
const PARAM: &str = "UrlFeedBucketParam";
const ROLE: &str = "RetrieveUrlFeedLambdaRole";
const FUNCTION: &str = "RetrieveUrlFeedLambda";
const LOG_GROUP: &str = "RetrieveUrlFeedLogGroup";
const API: &str = "RestApi";
const FEED_RESOURCE: &str = "RestApiFeed";
const FEED_METHOD: &str = "RestApiFeedGET";
const DEPLOYMENT: &str = "RestApiDeployment";
const STAGE: &str = "RestApiStage";
const INVOKE_PERMISSION: &str = "RestApiFeedInvokePermission";

fn r#ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// Build the full template for `ctx`.
pub fn synthesize(ctx: &DeploymentContext) -> serde_json::Result<Value> {
    let mut resources = Map::new();
    resources.insert(BUCKET.into(), bucket(ctx));
    resources.insert(PARAM.into(), location_parameter(ctx)?);
    resources.insert(ROLE.into(), execution_role(ctx));
    resources.insert(FUNCTION.into(), function(ctx));
    resources.insert(LOG_GROUP.into(), log_group());
    for (id, resource) in rest_api() {
        resources.insert(id.into(), resource);
    }

    Ok(json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": "URL feed: GET /feed serves objects from the feed bucket",
        "Parameters": {
            "CodeBucket": {
                "Type": "String",
                "Description": "Bucket holding the function's zip artifact"
            },
            "CodeKey": {
                "Type": "String",
                "Description": "Key of the function's zip artifact"
            }
        },
        "Resources": resources,
        "Outputs": {
            "RestApiURL": {
                "Value": {
                    "Fn::Sub": format!(
                        "https://${{{API}}}.execute-api.${{AWS::Region}}.${{AWS::URLSuffix}}/{STAGE_NAME}/"
                    )
                }
            }
        }
    }))
}

fn bucket(ctx: &DeploymentContext) -> Value {
    let mut properties = json!({
        "NotificationConfiguration": {
            "EventBridgeConfiguration": { "EventBridgeEnabled": true }
        }
    });

    if let Some(alias) = ctx.kms_alias_name() {
        properties["BucketEncryption"] = json!({
            "ServerSideEncryptionConfiguration": [{
                "BucketKeyEnabled": true,
                "ServerSideEncryptionByDefault": {
                    "SSEAlgorithm": "aws:kms",
                    "KMSMasterKeyID": {
                        "Fn::Sub": format!(
                            "arn:${{AWS::Partition}}:kms:${{AWS::Region}}:${{AWS::AccountId}}:alias/{alias}"
                        )
                    }
                }
            }]
        });
    }

    json!({
        "Type": "AWS::S3::Bucket",
        "DeletionPolicy": "Delete",
        "UpdateReplacePolicy": "Delete",
        "Properties": properties
    })
}

fn location_parameter(ctx: &DeploymentContext) -> serde_json::Result<Value> {
    // `${UrlFeedBucket}` is resolved by Fn::Sub at deploy time.
    let location = FeedLocation {
        bucket_name: format!("${{{BUCKET}}}"),
        object_key: Some(ctx.object_key().to_string()),
    };

    let value = location.to_json_pretty()?;

    Ok(json!({
        "Type": "AWS::SSM::Parameter",
        "Properties": {
            "Type": "String",
            "Value": { "Fn::Sub": value }
        }
    }))
}

fn execution_role(ctx: &DeploymentContext) -> Value {
    let mut statements = vec![
        json!({
            "Effect": "Allow",
            "Action": ["s3:GetObject*", "s3:GetBucket*", "s3:List*"],
            "Resource": [
                get_att(BUCKET, "Arn"),
                { "Fn::Sub": format!("${{{BUCKET}.Arn}}/*") }
            ]
        }),
        json!({
            "Effect": "Allow",
            "Action": [
                "ssm:DescribeParameters",
                "ssm:GetParameters",
                "ssm:GetParameter",
                "ssm:GetParameterHistory"
            ],
            "Resource": {
                "Fn::Sub": format!(
                    "arn:${{AWS::Partition}}:ssm:${{AWS::Region}}:${{AWS::AccountId}}:parameter/${{{PARAM}}}"
                )
            }
        }),
    ];

    if let Some(alias) = ctx.kms_alias_name() {
        statements.push(json!({
            "Effect": "Allow",
            "Action": ["kms:Decrypt", "kms:DescribeKey"],
            "Resource": "*",
            "Condition": {
                "ForAnyValue:StringEquals": { "kms:ResourceAliases": format!("alias/{alias}") }
            }
        }));
    }

    let mut properties = json!({
        "AssumeRolePolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "lambda.amazonaws.com" },
                "Action": "sts:AssumeRole"
            }]
        },
        "ManagedPolicyArns": [{
            "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
        }],
        "Policies": [{
            "PolicyName": "RetrieveUrlFeedRead",
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": statements
            }
        }]
    });

    if let Some(boundary) = ctx.permissions_boundary() {
        properties["PermissionsBoundary"] = boundary;
    }

    json!({
        "Type": "AWS::IAM::Role",
        "Properties": properties
    })
}

fn function(ctx: &DeploymentContext) -> Value {
    let mut variables = Map::new();
    variables.insert(BUCKET_PARAM_ENV.into(), r#ref(PARAM));
    // REST API events carry `/prod/feed`; routes are matched on `/feed`.
    variables.insert("AWS_LAMBDA_HTTP_IGNORE_STAGE_IN_PATH".into(), json!("true"));
    if ctx.debug {
        variables.insert("DEBUG".into(), json!("1"));
    }

    json!({
        "Type": "AWS::Lambda::Function",
        "Properties": {
            "Runtime": "provided.al2023",
            "Handler": "bootstrap",
            "Architectures": ["arm64"],
            "Code": {
                "S3Bucket": r#ref("CodeBucket"),
                "S3Key": r#ref("CodeKey")
            },
            "Role": get_att(ROLE, "Arn"),
            "Timeout": FUNCTION_TIMEOUT_SECS,
            "Environment": { "Variables": variables }
        }
    })
}

fn log_group() -> Value {
    json!({
        "Type": "AWS::Logs::LogGroup",
        "DeletionPolicy": "Retain",
        "Properties": {
            "LogGroupName": { "Fn::Sub": format!("/aws/lambda/${{{FUNCTION}}}") },
            "RetentionInDays": LOG_RETENTION_DAYS
        }
    })
}

fn rest_api() -> Vec<(&'static str, Value)> {
    let integration_uri = format!(
        "arn:${{AWS::Partition}}:apigateway:${{AWS::Region}}:lambda:path/2015-03-31/functions/${{{FUNCTION}.Arn}}/invocations"
    );

    vec![
        (
            API,
            json!({
                "Type": "AWS::ApiGateway::RestApi",
                "Properties": {
                    "Name": "RestApi",
                    "BinaryMediaTypes": ["*/*"]
                }
            }),
        ),
        (
            FEED_RESOURCE,
            json!({
                "Type": "AWS::ApiGateway::Resource",
                "Properties": {
                    "RestApiId": r#ref(API),
                    "ParentId": get_att(API, "RootResourceId"),
                    "PathPart": "feed"
                }
            }),
        ),
        (
            FEED_METHOD,
            json!({
                "Type": "AWS::ApiGateway::Method",
                "Properties": {
                    "RestApiId": r#ref(API),
                    "ResourceId": r#ref(FEED_RESOURCE),
                    "HttpMethod": "GET",
                    "AuthorizationType": "NONE",
                    "Integration": {
                        "Type": "AWS_PROXY",
                        "IntegrationHttpMethod": "POST",
                        "Uri": { "Fn::Sub": integration_uri }
                    }
                }
            }),
        ),
        (
            DEPLOYMENT,
            json!({
                "Type": "AWS::ApiGateway::Deployment",
                "DependsOn": [FEED_METHOD],
                "Properties": { "RestApiId": r#ref(API) }
            }),
        ),
        (
            STAGE,
            json!({
                "Type": "AWS::ApiGateway::Stage",
                "Properties": {
                    "RestApiId": r#ref(API),
                    "DeploymentId": r#ref(DEPLOYMENT),
                    "StageName": STAGE_NAME
                }
            }),
        ),
        (
            INVOKE_PERMISSION,
            json!({
                "Type": "AWS::Lambda::Permission",
                "Properties": {
                    "Action": "lambda:InvokeFunction",
                    "FunctionName": get_att(FUNCTION, "Arn"),
                    "Principal": "apigateway.amazonaws.com",
                    "SourceArn": {
                        "Fn::Sub": format!(
                            "arn:${{AWS::Partition}}:execute-api:${{AWS::Region}}:${{AWS::AccountId}}:${{{API}}}/*/GET/feed"
                        )
                    }
                }
            }),
        ),
    ]
}
