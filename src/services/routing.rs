//! 路由策略 - 业务能力层
//!
//! 只负责"这道题该按什么顺序尝试哪些模型"，不发起调用。

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::QuestionType;
use crate::services::registry::{ProviderRegistry, RoutingSlot};

/// 启用思考模式的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningReason {
    /// 题型配置开启了思考模式
    TypeConfig,
    /// 多选题自动开启
    MultipleChoice,
    /// 带图片题目自动开启
    Images,
}

/// 路由结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingDecision {
    /// 按顺序尝试的模型 ID
    pub candidates: Vec<String>,
    /// 建议使用思考模式（模型不支持时由执行器忽略）
    pub reasoning: bool,
    pub reasoning_reasons: Vec<ReasoningReason>,
    /// 图片题没有可用的多模态模型，降级到普通模型
    pub multimodal_fallback: bool,
}

impl RoutingDecision {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// 路由策略
#[derive(Debug, Clone, Copy)]
pub struct RoutingPolicy {
    pub auto_reasoning_for_multiple: bool,
    pub auto_reasoning_for_images: bool,
}

impl RoutingPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            auto_reasoning_for_multiple: config.auto_reasoning_for_multiple,
            auto_reasoning_for_images: config.auto_reasoning_for_images,
        }
    }

    /// 为题目选出候选模型列表
    pub fn select(
        &self,
        question_type: QuestionType,
        has_images: bool,
        registry: &ProviderRegistry,
    ) -> RoutingDecision {
        let slot = RoutingSlot::for_type(question_type);
        let mut decision = RoutingDecision::default();

        if has_images {
            // 图片题专用列表优先，其次是题型列表中的多模态模型
            let mut ids: Vec<String> = Vec::new();
            let image_list = registry.get_enabled_providers(RoutingSlot::Image, true);
            let type_list = slot
                .map(|slot| registry.get_enabled_providers(slot, true))
                .unwrap_or_default();
            for provider in image_list.into_iter().chain(type_list) {
                if !ids.contains(&provider.id) {
                    ids.push(provider.id.clone());
                }
            }

            if ids.is_empty() {
                if let Some(provider) = registry.first_enabled(true) {
                    info!("💡 图片题未配置专用模型，使用多模态模型 {}", provider.id);
                    ids.push(provider.id.clone());
                } else if let Some(provider) = registry.first_enabled(false) {
                    warn!(
                        "⚠️ 没有可用的多模态模型，降级使用 {}（该模型可能不支持图片）",
                        provider.id
                    );
                    ids.push(provider.id.clone());
                    decision.multimodal_fallback = true;
                }
            }
            decision.candidates = ids;
        } else {
            let ids: Vec<String> = slot
                .map(|slot| registry.get_enabled_providers(slot, false))
                .unwrap_or_default()
                .into_iter()
                .map(|p| p.id.clone())
                .collect();

            decision.candidates = if !ids.is_empty() {
                ids
            } else if let Some(provider) = registry.default_provider().filter(|p| p.enabled) {
                vec![provider.id.clone()]
            } else if let Some(provider) = registry.first_enabled(false) {
                vec![provider.id.clone()]
            } else {
                Vec::new()
            };
        }

        if slot.map(|slot| registry.reasoning_enabled(slot)).unwrap_or(false) {
            decision.reasoning_reasons.push(ReasoningReason::TypeConfig);
        }
        if question_type == QuestionType::Multiple && self.auto_reasoning_for_multiple {
            decision.reasoning_reasons.push(ReasoningReason::MultipleChoice);
        }
        if has_images && self.auto_reasoning_for_images {
            decision.reasoning_reasons.push(ReasoningReason::Images);
        }
        decision.reasoning = !decision.reasoning_reasons.is_empty();

        decision
    }
}
