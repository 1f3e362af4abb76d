pub mod fixed_face_detector;
pub mod onnx_blazeface_detector;
