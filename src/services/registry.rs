//! 模型注册表
//!
//! 持有所有已配置的模型后端，以及每个题型（和图片题）的模型优先级列表。
//! 启动时加载，之后只通过显式的管理操作修改。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::RegistryError;
use crate::models::{ProviderConfig, QuestionType, TokenPricing};

/// 进程内共享的注册表
pub type SharedRegistry = Arc<RwLock<ProviderRegistry>>;

/// 优先级列表的分组：四种题型加一个"图片题"分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingSlot {
    Single,
    Multiple,
    Judgement,
    Completion,
    Image,
}

impl RoutingSlot {
    pub const ALL: [RoutingSlot; 5] = [
        RoutingSlot::Single,
        RoutingSlot::Multiple,
        RoutingSlot::Judgement,
        RoutingSlot::Completion,
        RoutingSlot::Image,
    ];

    /// 题型对应的分组，未知题型没有分组
    pub fn for_type(question_type: QuestionType) -> Option<Self> {
        match question_type {
            QuestionType::Single => Some(RoutingSlot::Single),
            QuestionType::Multiple => Some(RoutingSlot::Multiple),
            QuestionType::Judgement => Some(RoutingSlot::Judgement),
            QuestionType::Completion => Some(RoutingSlot::Completion),
            QuestionType::Unknown => None,
        }
    }
}

/// 某个分组的模型优先级和思考模式配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRouting {
    pub providers: Vec<String>,
    pub enable_reasoning: bool,
}

/// 模型注册表
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    /// 保持添加顺序，"第一个可用模型"按这个顺序取
    providers: Vec<ProviderConfig>,
    routing: HashMap<RoutingSlot, TypeRouting>,
    default_provider: Option<String>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// 创建空注册表，多选题默认开启思考模式
    pub fn new() -> Self {
        let mut routing: HashMap<RoutingSlot, TypeRouting> = RoutingSlot::ALL
            .iter()
            .map(|slot| (*slot, TypeRouting::default()))
            .collect();
        if let Some(multiple) = routing.get_mut(&RoutingSlot::Multiple) {
            multiple.enable_reasoning = true;
        }
        Self {
            providers: Vec::new(),
            routing,
            default_provider: None,
        }
    }

    /// 根据环境变量中的密钥生成系统模型，并配置默认的题型映射
    ///
    /// - 单选 / 判断 / 填空：DeepSeek Chat，思考模式下切换到 deepseek-reasoner
    /// - 多选：DeepSeek Reasoner，失败后 DeepSeek Chat
    /// - 图片题：豆包
    pub fn with_system_providers(config: &Config) -> Self {
        let mut registry = Self::new();
        let deepseek_pricing = TokenPricing {
            input_per_million: 2.0,
            output_per_million: 3.0,
        };

        if !config.deepseek_api_key.is_empty() {
            registry.providers.push(
                ProviderConfig::new(
                    "system_deepseek_chat",
                    &config.deepseek_base_url,
                    &config.deepseek_api_key,
                    "deepseek-chat",
                )
                .with_name("DeepSeek Chat (系统配置)")
                .reasoning(true)
                .with_reasoning_model("deepseek-reasoner")
                .with_output_tokens(config.max_tokens, config.reasoning_max_tokens)
                .with_sampling(config.temperature, config.top_p)
                .with_pricing(deepseek_pricing)
                .system(),
            );
            registry.providers.push(
                ProviderConfig::new(
                    "system_deepseek_reasoner",
                    &config.deepseek_base_url,
                    &config.deepseek_api_key,
                    "deepseek-reasoner",
                )
                .with_name("DeepSeek Reasoner (系统配置)")
                .reasoning(true)
                .with_output_tokens(config.max_tokens, config.reasoning_max_tokens)
                .with_sampling(config.temperature, config.top_p)
                .with_pricing(deepseek_pricing)
                .system(),
            );
            info!("✅ 已导入系统模型: DeepSeek Chat / DeepSeek Reasoner");
        }

        if !config.doubao_api_key.is_empty() && !config.doubao_model.is_empty() {
            registry.providers.push(
                ProviderConfig::new(
                    "system_doubao",
                    &config.doubao_base_url,
                    &config.doubao_api_key,
                    &config.doubao_model,
                )
                .with_name("豆包 Doubao (系统配置)")
                .multimodal(true)
                .reasoning(true)
                .with_reasoning_effort(&config.reasoning_effort)
                .with_output_tokens(config.max_tokens, config.reasoning_max_tokens)
                .with_sampling(config.temperature, config.top_p)
                .with_pricing(TokenPricing {
                    input_per_million: 0.8,
                    output_per_million: 2.0,
                })
                .system(),
            );
            info!("✅ 已导入系统模型: 豆包");
        }

        let has = |registry: &Self, id: &str| registry.get(id).is_some();
        if has(&registry, "system_deepseek_chat") {
            for slot in [RoutingSlot::Single, RoutingSlot::Judgement, RoutingSlot::Completion] {
                registry.set_routing_unchecked(slot, vec!["system_deepseek_chat".to_string()]);
            }
            registry.set_routing_unchecked(
                RoutingSlot::Multiple,
                vec![
                    "system_deepseek_reasoner".to_string(),
                    "system_deepseek_chat".to_string(),
                ],
            );
        }
        if has(&registry, "system_doubao") {
            registry.set_routing_unchecked(RoutingSlot::Image, vec!["system_doubao".to_string()]);
        }

        registry.default_provider = config
            .default_provider
            .clone()
            .filter(|id| has(&registry, id));

        registry
    }

    fn set_routing_unchecked(&mut self, slot: RoutingSlot, ids: Vec<String>) {
        self.routing.entry(slot).or_default().providers = ids;
    }

    // ========== 管理操作 ==========

    /// 添加模型
    pub fn add_provider(&mut self, provider: ProviderConfig) -> Result<(), RegistryError> {
        validate(&provider)?;
        if self.get(&provider.id).is_some() {
            return Err(RegistryError::DuplicateProvider(provider.id));
        }
        info!("✅ 已添加模型: {} - {}", provider.id, provider.name);
        self.providers.push(provider);
        Ok(())
    }

    /// 更新模型配置，系统模型不可修改
    pub fn update_provider(&mut self, id: &str, mut provider: ProviderConfig) -> Result<(), RegistryError> {
        validate(&provider)?;
        let existing = self
            .providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))?;
        if existing.is_system {
            return Err(RegistryError::SystemProvider(id.to_string()));
        }
        provider.id = id.to_string();
        provider.is_system = false;
        *existing = provider;
        info!("✅ 已更新模型: {}", id);
        Ok(())
    }

    /// 删除模型，并从所有优先级列表中移除
    pub fn remove_provider(&mut self, id: &str) -> Result<ProviderConfig, RegistryError> {
        let index = self
            .providers
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))?;
        if self.providers[index].is_system {
            return Err(RegistryError::SystemProvider(id.to_string()));
        }
        for routing in self.routing.values_mut() {
            routing.providers.retain(|p| p != id);
        }
        if self.default_provider.as_deref() == Some(id) {
            self.default_provider = None;
        }
        info!("✅ 已删除模型: {}", id);
        Ok(self.providers.remove(index))
    }

    /// 启用或禁用模型
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), RegistryError> {
        let provider = self
            .providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))?;
        provider.enabled = enabled;
        Ok(())
    }

    /// 设置分组的模型优先级列表
    ///
    /// `enable_reasoning` 为 `None` 时保持原有的思考模式配置。
    pub fn set_priority_list(
        &mut self,
        slot: RoutingSlot,
        ids: Vec<String>,
        enable_reasoning: Option<bool>,
    ) -> Result<(), RegistryError> {
        if let Some(missing) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(RegistryError::UnknownProvider(missing.clone()));
        }
        let routing = self.routing.entry(slot).or_default();
        routing.providers = ids;
        if let Some(enable) = enable_reasoning {
            routing.enable_reasoning = enable;
        }
        info!("✅ 已设置 {:?} 的模型列表和思考配置", slot);
        Ok(())
    }

    pub fn set_default_provider(&mut self, id: Option<&str>) -> Result<(), RegistryError> {
        if let Some(id) = id {
            if self.get(id).is_none() {
                return Err(RegistryError::UnknownProvider(id.to_string()));
            }
        }
        self.default_provider = id.map(str::to_string);
        Ok(())
    }

    // ========== 查询 ==========

    pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn get_priority_list(&self, slot: RoutingSlot) -> &[String] {
        self.routing
            .get(&slot)
            .map(|r| r.providers.as_slice())
            .unwrap_or(&[])
    }

    pub fn reasoning_enabled(&self, slot: RoutingSlot) -> bool {
        self.routing.get(&slot).map(|r| r.enable_reasoning).unwrap_or(false)
    }

    pub fn default_provider(&self) -> Option<&ProviderConfig> {
        self.default_provider.as_deref().and_then(|id| self.get(id))
    }

    /// 分组优先级列表中已启用的模型（按优先级排序）
    pub fn get_enabled_providers(&self, slot: RoutingSlot, multimodal_required: bool) -> Vec<&ProviderConfig> {
        self.get_priority_list(slot)
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|p| p.enabled && (!multimodal_required || p.supports_multimodal))
            .collect()
    }

    /// 按添加顺序的第一个已启用模型
    pub fn first_enabled(&self, multimodal_required: bool) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|p| p.enabled && (!multimodal_required || p.supports_multimodal))
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }
}

fn validate(provider: &ProviderConfig) -> Result<(), RegistryError> {
    if provider.id.trim().is_empty() {
        return Err(RegistryError::MissingField("id"));
    }
    if provider.endpoint.trim().is_empty() {
        return Err(RegistryError::MissingField("endpoint"));
    }
    if provider.model.trim().is_empty() {
        return Err(RegistryError::MissingField("model"));
    }
    Ok(())
}
