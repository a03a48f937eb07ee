//! Kontext image-edit instruction presets.
//!
//! Each preset is a brief for a vision-language model. A brief may hold one
//! `$user_prompt$` placeholder that is replaced by the user's request.

/// Placeholder substituted with the user's request.
pub const USER_PROMPT_PLACEHOLDER: &str = "$user_prompt$";

/// Substituted when the user gave no request.
pub const GENERIC_REQUEST: &str = "the user's desired transformation";

pub const PREFIX: &str = r#"You are a creative prompt engineer. Your mission is to analyze the provided image and generate exactly 1 distinct image transformation *instructions*. IMPORTANT: You must respond in English only."#;

pub const SUFFIX: &str = r#"Your response must consist of concise instruction ready for the image editing AI. Do not add any conversational text, explanations, or deviations; only the instructions. Remember to respond in English only."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KontextPreset {
    pub name: &'static str,
    pub brief: &'static str,
}

pub const PRESETS: &[KontextPreset] = &[
    KontextPreset {
        name: "Context Deep Fusion (情境深度融合)",
        brief: r#"IMPORTANT: Respond in English only. The provided image is a composite with a head and body from drastically different contexts (lighting, style, condition). Your mission is to generate instructions for a complete narrative and physical transformation of the head to flawlessly match the body and scene. The instructions must guide the AI to: 1. **Cinematic Re-Lighting**: Describe in vivid detail the scene's light sources (color, direction, hardness) and how this light should sculpt the head's features with new, appropriate shadows and highlights. 2. **Contextual Storytelling**: Instruct to add physical evidence of the scene's story onto the head, such as grime from a battle, sweat from exertion, or rain droplets from a storm. 3. **Color Grading Unification**: Detail how to apply the scene's specific color grade (e.g., cool desaturated tones, warm golden hour hues) to the head. 4. **Asset & Hair Adaptation**: Command the modification or removal of out-of-place elements (like clean jewelry in a gritty scene) and the restyling of the hair to fit the environment (e.g., messy, windblown, wet). 5. **Flawless Final Integration**: As the final step, describe the process of blending the neckline to be completely invisible, ensuring a uniform film grain and texture across the entire person."#,
    },
    KontextPreset {
        name: "Seamless Integration (无痕融合)",
        brief: r#"IMPORTANT: Respond in English only. This image is a composite with minor inconsistencies between the head and body. Your task is to generate instructions for a subtle but master-level integration. Focus on creating a photorealistic and utterly convincing final image. The instructions should detail: 1. **Micro-Lighting Adjustment**: Fine-tune the lighting and shadows around the neck and jawline to create a perfect match. 2. **Skin Tone & Texture Unification**: Describe the process of unifying the skin tones for a seamless look, and more importantly, harmonizing the micro-textures like pores, fine hairs, and film grain across the blended area. 3. **Edge Blending Perfection**: Detail how to create an invisible transition at the neckline, making it appear as if it was never separate."#,
    },
    KontextPreset {
        name: "Scene Teleportation (场景传送)",
        brief: r#"IMPORTANT: Respond in English only. Imagine the main subject of the image is suddenly teleported to a completely different and unexpected environment, while maintaining their exact pose. Based on the user's specific request: $user_prompt$, describe this new, richly detailed scene. The instruction must detail how the new environment's lighting and atmosphere should realistically affect the subject, including any necessary adjustments to clothing, accessories, or physical appearance to match the new setting."#,
    },
    KontextPreset {
        name: "Season Change (季节变换)",
        brief: r#"IMPORTANT: Respond in English only. Transform the entire scene to be convincingly set in a different season. Based on the user's specific request: $user_prompt$, describe the seasonal transformation in detail. Include atmospheric effects like weather conditions, seasonal lighting, foliage changes, and appropriate clothing adjustments for the subject. Make sure the transformation feels natural and seasonally appropriate."#,
    },
    KontextPreset {
        name: "Fantasy World (幻想领域)",
        brief: r#"IMPORTANT: Respond in English only. Transport the entire scene and its subject into a specific, richly detailed fantasy or sci-fi universe. Based on the user's specific request: $user_prompt$, describe the complete aesthetic overhaul. Replace modern elements with fantasy/sci-fi equivalents, transform clothing and accessories to match the new universe, and ensure the subject's appearance fits the magical or futuristic setting."#,
    },
    KontextPreset {
        name: "Camera Movement (移动镜头)",
        brief: r#"IMPORTANT: Respond in English only. Propose a dramatic and purposeful camera movement that reveals a new perspective or emotion in the scene. Based on the user's specific request: $user_prompt$, describe the *type* of shot and its *narrative purpose*. Explain how this camera movement enhances the story or emotion, and detail any necessary adjustments to composition, lighting, or focus to achieve the desired cinematic effect."#,
    },
    KontextPreset {
        name: "Relighting (重新布光)",
        brief: r#"IMPORTANT: Respond in English only. Completely transform the mood and story of the image by proposing a new, cinematic lighting scheme. Based on the user's specific request: $user_prompt$, describe the lighting transformation in detail. Specify light sources, their positions, intensities, colors, and how they create the desired mood. Include any necessary adjustments to shadows, highlights, and overall atmosphere."#,
    },
    KontextPreset {
        name: "Camera Zoom (画面缩放)",
        brief: r#"IMPORTANT: Respond in English only. Describe a specific zoom action that serves a narrative purpose. Based on the user's specific request: $user_prompt$, propose either a dramatic 'push-in' (zoom in) or a revealing 'pull-out' (zoom out). Explain the narrative purpose of this zoom, what new information or emotion it reveals, and any necessary adjustments to focus, depth of field, or composition."#,
    },
    KontextPreset {
        name: "Professional Product Photography (专业产品图)",
        brief: r#"IMPORTANT: Respond in English only. Re-imagine this image as a high-end commercial product photograph. Based on the user's specific request: $user_prompt$, describe the professional photography setup. Specify the studio lighting arrangement, background treatment, composition style, and any props or lifestyle elements that enhance the product's appeal. Focus on creating an aspirational, commercial-quality image."#,
    },
    KontextPreset {
        name: "Tilt-Shift Miniature (微缩世界)",
        brief: r#"IMPORTANT: Respond in English only. Convert the entire scene into a charming and highly detailed miniature model world. Based on the user's specific request: $user_prompt$, describe the tilt-shift miniature effect. Specify the depth of field adjustments, color saturation changes, and any modifications needed to enhance the toy-like, miniature appearance. Include details about focus areas and blur zones."#,
    },
    KontextPreset {
        name: "Reflection Addition (添加倒影)",
        brief: r#"IMPORTANT: Respond in English only. Introduce a new, reflective surface into the scene to create a more dynamic composition. Based on the user's specific request: $user_prompt$, describe the reflective surface and its placement. Specify the type of reflection (mirror-like, water, glass, etc.), its quality and distortion, and how it enhances the overall composition and mood of the scene."#,
    },
    KontextPreset {
        name: "Hair Style Change (更换发型)",
        brief: r#"IMPORTANT: Respond in English only. Describe a complete hair transformation for the subject. Based on the user's specific request: $user_prompt$, detail the new hairstyle, including cut, color, texture, and styling. Explain how this hair change reflects the desired persona or story, and include any necessary adjustments to accessories or clothing to complement the new look."#,
    },
    KontextPreset {
        name: "Bodybuilding Transformation (肌肉猛男化)",
        brief: r#"IMPORTANT: Respond in English only. Dramatically transform the subject into a hyper-realistic, massively muscled bodybuilder. Based on the user's specific request: $user_prompt$, describe the bodybuilding transformation in detail. Specify muscle development, body proportions, skin texture changes, and any necessary clothing modifications to accommodate and showcase the new physique."#,
    },
    KontextPreset {
        name: "Age Transformation (时光旅人)",
        brief: r#"IMPORTANT: Respond in English only. Visibly and realistically age or de-age the main subject. Based on the user's specific request: $user_prompt$, describe the age transformation in detail. Specify facial changes, hair modifications, skin texture adjustments, and any other age-related alterations. Ensure the transformation looks natural and appropriate for the target age."#,
    },
    KontextPreset {
        name: "Fashion Makeover (衣橱改造)",
        brief: r#"IMPORTANT: Respond in English only. Give the subject a complete fashion makeover into a specific style. Based on the user's specific request: $user_prompt$, describe the entire outfit transformation. Specify clothing items, accessories, styling details, and how this fashion change reflects the desired aesthetic or persona. Include any necessary adjustments to hair or makeup to complement the new look."#,
    },
    KontextPreset {
        name: "Furniture Removal (清空家具)",
        brief: r#"IMPORTANT: Respond in English only. Imagine the room in the image has been completely emptied for renovation. Based on the user's specific request: $user_prompt$, describe the furniture removal process. Specify what items need to be removed, how to realistically recreate the empty surfaces, and any necessary adjustments to lighting or architectural details to maintain the room's integrity."#,
    },
    KontextPreset {
        name: "Interior Design (室内设计)",
        brief: r#"IMPORTANT: Respond in English only. Redesign this space in a specific, evocative style. Based on the user's specific request: $user_prompt$, describe the complete interior redesign. Specify furniture, color schemes, lighting, decor elements, and overall aesthetic while keeping the room's core structure intact. Create a cohesive design that reflects the desired style and mood."#,
    },
    KontextPreset {
        name: "Image Colorization (图像上色)",
        brief: r#"IMPORTANT: Respond in English only. Describe a specific artistic style for colorizing a black and white image. Based on the user's specific request: $user_prompt$, detail the colorization approach. Specify color palette choices, artistic style influences, mood considerations, and any special effects that enhance the colorization. Go beyond simple colorization to create an artistic interpretation."#,
    },
    KontextPreset {
        name: "Cartoon/Anime Style (卡通漫画化)",
        brief: r#"IMPORTANT: Respond in English only. Redraw the entire image in a specific animated or illustrated style. Based on the user's specific request: $user_prompt$, describe the cartoon/anime transformation. Specify the artistic style, visual characteristics, color treatment, and any stylistic elements that define the chosen animation or illustration approach."#,
    },
    KontextPreset {
        name: "Artistic Style Imitation (艺术风格模仿)",
        brief: r#"IMPORTANT: Respond in English only. Repaint the entire image in the style of a famous art movement. Based on the user's specific request: $user_prompt$, describe the artistic style transformation. Specify the art movement, its defining characteristics, brushwork techniques, color palette, and any other stylistic elements that capture the essence of the chosen artistic style."#,
    },
    KontextPreset {
        name: "Pixel Art (像素艺术)",
        brief: r#"IMPORTANT: Respond in English only. Deconstruct the image into pixel art aesthetic. Based on the user's specific request: $user_prompt$, describe the pixel art transformation. Specify color palette limitations, pixel resolution, dithering techniques, and any retro gaming influences that create authentic pixel art appearance."#,
    },
    KontextPreset {
        name: "Pencil Sketch (铅笔手绘)",
        brief: r#"IMPORTANT: Respond in English only. Transform the image into a pencil sketch style. Based on the user's specific request: $user_prompt$, describe the pencil sketch transformation. Specify line quality, shading techniques, paper texture effects, and any artistic considerations that create an authentic hand-drawn pencil sketch appearance."#,
    },
    KontextPreset {
        name: "Oil Painting (油画风格)",
        brief: r#"IMPORTANT: Respond in English only. Transform the image into an oil painting style. Based on the user's specific request: $user_prompt$, describe the oil painting transformation. Specify brushwork techniques, color palette choices, texture effects, and any artistic elements that create an authentic oil painting aesthetic."#,
    },
    KontextPreset {
        name: "Material Transformation (材质置换)",
        brief: r#"IMPORTANT: Respond in English only. Re-imagine the main subject as a sculpture made from an unexpected material. Based on the user's specific request: $user_prompt$, describe the material transformation. Specify the new material's properties, how it affects the subject's appearance, lighting interactions, and any textural or reflective qualities that define the material."#,
    },
    KontextPreset {
        name: "Movie Poster (电影海报)",
        brief: r#"IMPORTANT: Respond in English only. Transform the image into a compelling movie poster. Based on the user's specific request: $user_prompt$, describe the movie poster transformation. Specify the film genre, visual treatment, typography elements, and any cinematic effects that create an authentic movie poster appearance."#,
    },
    KontextPreset {
        name: "Technical Blueprint (蓝图视角)",
        brief: r#"IMPORTANT: Respond in English only. Convert the image into a technical blueprint. Based on the user's specific request: $user_prompt$, describe the blueprint transformation. Specify the technical drawing style, measurement annotations, schematic elements, and any architectural or engineering details that create an authentic technical blueprint appearance."#,
    },
    KontextPreset {
        name: "Text Removal (移除文字)",
        brief: r#"IMPORTANT: Respond in English only. Remove all text from the image as a meticulous restoration project. Based on the user's specific request: $user_prompt$, describe the text removal process. Specify which text elements need to be removed, how to reconstruct underlying surfaces, and any restoration techniques needed to create a seamless, text-free image."#,
    },
    KontextPreset {
        name: "Character Viewpoint Change (角色视角变换)",
        brief: r#"IMPORTANT: Respond in English only. Generate a $user_prompt$ view of the same character, keeping all visual features identical, including facial structure, hairstyle, expression, body proportions, clothing design, and rendering style. Only change the viewpoint angle. Ensure that lighting direction, shading, and character identity remain consistent with the original image, with no alterations to details other than the perspective. The instruction must specify the exact camera angle and position while maintaining perfect character consistency."#,
    },
];

pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

pub fn find(name: &str) -> Option<&'static KontextPreset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Full instruction for `preset_name`. An unknown preset yields an empty brief
/// between the prefix and suffix.
pub fn compose(preset_name: &str, user_prompt: &str) -> String {
    let brief = find(preset_name).map(|p| p.brief).unwrap_or("");
    let request = match user_prompt.trim() {
        "" => GENERIC_REQUEST,
        trimmed => trimmed,
    };
    let brief = brief.replace(USER_PROMPT_PLACEHOLDER, request);
    format!("{}\nThe Brief:{}\n{}", PREFIX, brief, SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_unique_and_single_placeholder() {
        let mut names = names();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        for p in PRESETS {
            assert!(p.brief.matches(USER_PROMPT_PLACEHOLDER).count() <= 1, "{}", p.name);
        }
    }

    #[test]
    fn test_compose_substitutes_request() {
        let out = compose("Season Change (季节变换)", "  deep winter  ");
        assert!(out.starts_with(PREFIX));
        assert!(out.ends_with(SUFFIX));
        assert!(out.contains("request: deep winter, describe"));
        assert!(!out.contains(USER_PROMPT_PLACEHOLDER));
    }

    #[test]
    fn test_compose_generic_when_empty() {
        let out = compose("Relighting (重新布光)", "");
        assert!(out.contains(GENERIC_REQUEST));
    }

    #[test]
    fn test_unknown_preset() {
        assert_eq!(compose("nope", "x"), format!("{}\nThe Brief:\n{}", PREFIX, SUFFIX));
    }
}
