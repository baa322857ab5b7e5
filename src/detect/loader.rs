use anyhow::Result;
use std::path::Path;

use crate::config::DetectorSettings;
use crate::error::StartupError;

use super::backend::DetectorBackend;
use super::backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
use super::backends::TractBackend;

/// Pick and construct a detector backend from the model path.
///
/// - `*.onnx` loads a YOLOv8-style model through tract (feature `backend-tract`)
/// - `*.json` replays a recorded detection script
///
/// Any load failure is a configuration error: the process must not enter the
/// stream loop without a working detector.
pub fn load_backend(model_path: &Path, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let extension = model_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => {
            let backend = ScriptedBackend::from_path(model_path).map_err(|e| {
                StartupError::configuration(format!(
                    "failed to load detection script '{}': {:#}",
                    model_path.display(),
                    e
                ))
            })?;
            log::info!(
                "detector: scripted ({} frames) from {}",
                backend.len(),
                model_path.display()
            );
            Ok(Box::new(backend))
        }
        Some("onnx") => load_onnx(model_path, settings),
        _ => Err(StartupError::configuration(format!(
            "unsupported model format '{}' (expected .onnx weights or a .json detection script)",
            model_path.display()
        ))
        .into()),
    }
}

#[cfg(feature = "backend-tract")]
fn load_onnx(model_path: &Path, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let backend = TractBackend::new(model_path, settings.clone()).map_err(|e| {
        StartupError::configuration(format!(
            "failed to load model '{}': {:#}",
            model_path.display(),
            e
        ))
    })?;
    log::info!(
        "detector: tract onnx {} ({}x{}, {} classes)",
        model_path.display(),
        settings.input_width,
        settings.input_height,
        settings.class_names.len()
    );
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(model_path: &Path, _settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(StartupError::configuration(format!(
        "model '{}' requires the backend-tract feature",
        model_path.display()
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StartupErrorKind;
    use std::io::Write;

    #[test]
    fn json_model_path_loads_scripted_backend() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"frames": [[]]}}"#).unwrap();
        let backend = load_backend(file.path(), &DetectorSettings::default()).unwrap();
        assert_eq!(backend.name(), "scripted");
    }

    #[test]
    fn unknown_extension_is_a_configuration_error() {
        let err = load_backend(Path::new("best.pt"), &DetectorSettings::default())
            .err()
            .unwrap();
        let startup = err.downcast_ref::<StartupError>().unwrap();
        assert_eq!(startup.kind, StartupErrorKind::Configuration);
    }
}
