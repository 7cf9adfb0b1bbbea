mod common;

use anyhow::anyhow;
use common::{face, fake_api, fake_backend, image, mesh_at, FaceScript, MeshScript};
use facekit_vision::environment::BackendProbe;
use facekit_vision::model::{RawFace, RawMesh};
use facekit_vision::{
    Backend, BoundingBox, Environment, FaceApi, FaceApiOptions, FaceError, Media, Point3D,
};
use ndarray::Array3;

fn node(options: FaceApiOptions) -> FaceApiOptions {
    FaceApiOptions {
        environment: Some(Environment::Node),
        ..options
    }
}

fn faces(faces: Vec<RawFace>) -> FaceScript {
    FaceScript {
        faces,
        ..Default::default()
    }
}

fn meshes(meshes: Vec<RawMesh>) -> MeshScript {
    MeshScript {
        meshes,
        ..Default::default()
    }
}

#[test]
fn boxes_are_reported_in_original_pixels_after_downscale() {
    let options = node(FaceApiOptions {
        downscale_width_threshold: Some(640),
        ..Default::default()
    });
    let (mut api, calls) = fake_api(
        options,
        faces(vec![face(200.0, 100.0, 100.0, 100.0, 0.9)]),
        MeshScript::default(),
    );

    let result = api.detect(&image(1280, 720), None).unwrap();

    assert_eq!(calls.faces.inputs(), vec![(640, 360)]);
    assert_eq!(result.faces.len(), 1);
    assert_eq!(
        *result.faces[0].bbox(),
        BoundingBox::new(400.0, 200.0, 200.0, 200.0)
    );
    assert_eq!(result.faces[0].score(), 0.9);
    assert!(result.timing.preprocessing.is_some());
    assert!(result.timing.inference.is_some());
    assert!(result.timing.postprocessing.is_some());
}

#[test]
fn narrow_inputs_are_not_resampled() {
    let options = node(FaceApiOptions {
        downscale_width_threshold: Some(640),
        ..Default::default()
    });
    let (mut api, calls) = fake_api(
        options,
        faces(vec![face(10.0, 10.0, 50.0, 50.0, 0.9)]),
        MeshScript::default(),
    );

    let result = api.detect(&image(640, 480), None).unwrap();

    assert_eq!(calls.faces.inputs(), vec![(640, 480)]);
    assert_eq!(
        *result.faces[0].bbox(),
        BoundingBox::new(10.0, 10.0, 50.0, 50.0)
    );
}

#[test]
fn no_faces_means_no_mesh_inference() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        FaceScript::default(),
        meshes(vec![mesh_at(1.0, 1.0)]),
    );

    let result = api.detect_with_landmarks(&image(320, 240), None).unwrap();

    assert!(result.faces.is_empty());
    assert_eq!(result.timing.postprocessing, None);
    assert_eq!(calls.faces.runs(), 1);
    assert_eq!(calls.mesh.loads(), 0);
    assert_eq!(calls.mesh.runs(), 0);
}

#[test]
fn single_landmark_face_is_the_largest_and_uses_a_full_resolution_crop() {
    let options = node(FaceApiOptions {
        max_landmark_faces: Some(1),
        downscale_width_threshold: Some(640),
        ..Default::default()
    });
    // Detector space is half resolution: the second face is 100x100 at
    // (200, 100) in the original image.
    let (mut api, calls) = fake_api(
        options,
        faces(vec![
            face(5.0, 5.0, 20.0, 20.0, 0.6),
            face(100.0, 50.0, 50.0, 50.0, 0.5),
        ]),
        meshes(vec![mesh_at(5.0, 5.0)]),
    );

    let result = api.detect_with_landmarks(&image(1280, 960), None).unwrap();

    assert_eq!(result.faces.len(), 1);
    let chosen = &result.faces[0];
    assert_eq!(*chosen.face.bbox(), BoundingBox::new(200.0, 100.0, 100.0, 100.0));
    assert_eq!(chosen.face.score(), 0.5);
    assert_eq!(calls.mesh.inputs(), vec![(100, 100)]);
    assert_eq!(
        chosen.landmarks.mesh_points,
        vec![Point3D::new(205.0, 105.0, 0.0)]
    );
}

#[test]
fn equal_areas_keep_the_first_face() {
    let options = node(FaceApiOptions {
        max_landmark_faces: Some(1),
        ..Default::default()
    });
    let (mut api, _calls) = fake_api(
        options,
        faces(vec![
            face(0.0, 0.0, 30.0, 30.0, 0.7),
            face(100.0, 100.0, 30.0, 30.0, 0.9),
        ]),
        meshes(vec![mesh_at(0.0, 0.0)]),
    );

    let result = api.detect_with_landmarks(&image(320, 240), None).unwrap();
    assert_eq!(result.faces.len(), 1);
    assert_eq!(result.faces[0].face.score(), 0.7);
}

#[test]
fn selected_face_outside_the_frame_falls_back_to_the_whole_input() {
    let options = node(FaceApiOptions {
        max_landmark_faces: Some(1),
        ..Default::default()
    });
    let (mut api, calls) = fake_api(
        options,
        faces(vec![
            face(10.0, 10.0, 20.0, 20.0, 0.9),
            face(700.0, 10.0, 50.0, 50.0, 0.8),
        ]),
        meshes(vec![mesh_at(720.0, 30.0)]),
    );

    let result = api.detect_with_landmarks(&image(640, 480), None).unwrap();

    assert_eq!(calls.mesh.inputs(), vec![(640, 480)]);
    assert_eq!(result.faces.len(), 1);
    assert_eq!(
        *result.faces[0].face.bbox(),
        BoundingBox::new(700.0, 10.0, 50.0, 50.0)
    );
    assert_eq!(
        result.faces[0].landmarks.mesh_points,
        vec![Point3D::new(720.0, 30.0, 0.0)]
    );
}

#[test]
fn non_graphics_environment_runs_mesh_on_the_whole_input() {
    let options = FaceApiOptions {
        environment: Some(Environment::ReactNative),
        max_landmark_faces: Some(1),
        downscale_width_threshold: Some(320),
        ..Default::default()
    };
    let (mut api, calls) = fake_api(
        options,
        faces(vec![
            face(0.0, 0.0, 40.0, 40.0, 0.6),
            face(200.0, 100.0, 100.0, 100.0, 0.5),
        ]),
        meshes(vec![mesh_at(250.0, 150.0)]),
    );

    let result = api.detect_with_landmarks(&image(640, 480), None).unwrap();

    assert_eq!(calls.faces.inputs(), vec![(640, 480)]);
    assert_eq!(calls.mesh.inputs(), vec![(640, 480)]);
    assert_eq!(result.faces.len(), 1);
    assert_eq!(
        *result.faces[0].face.bbox(),
        BoundingBox::new(200.0, 100.0, 100.0, 100.0)
    );
    assert_eq!(
        result.faces[0].landmarks.mesh_points,
        vec![Point3D::new(250.0, 150.0, 0.0)]
    );
}

#[test]
fn landmarks_pair_with_faces_by_position() {
    let (mut api, _calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![
            face(0.0, 0.0, 10.0, 10.0, 0.9),
            face(50.0, 0.0, 10.0, 10.0, 0.8),
            face(100.0, 0.0, 10.0, 10.0, 0.7),
        ]),
        meshes(vec![mesh_at(1.0, 1.0), mesh_at(2.0, 2.0)]),
    );

    let result = api.detect_with_landmarks(&image(320, 240), None).unwrap();

    assert_eq!(result.faces.len(), 3);
    let timing = result.timing;
    let inference = timing.inference.unwrap();
    assert!(inference >= 0.0);
    assert!(timing.total >= inference);
    assert!(timing.postprocessing.is_some());
    assert_eq!(result.faces[0].landmarks.mesh_points[0].x, 1.0);
    assert_eq!(result.faces[1].landmarks.mesh_points[0].x, 2.0);
    assert!(result.faces[2].landmarks.is_empty());
    assert_eq!(result.faces[2].face.score(), 0.7);
}

#[test]
fn mesh_points_are_upscaled_with_the_boxes() {
    let options = node(FaceApiOptions {
        downscale_width_threshold: Some(320),
        ..Default::default()
    });
    let (mut api, _calls) = fake_api(
        options,
        faces(vec![face(10.0, 10.0, 20.0, 20.0, 0.9)]),
        meshes(vec![RawMesh::new(vec![Point3D::new(15.0, 20.0, 3.0)])]),
    );

    let result = api.detect_with_landmarks(&image(640, 480), None).unwrap();

    let fused = &result.faces[0];
    assert_eq!(*fused.face.bbox(), BoundingBox::new(20.0, 20.0, 40.0, 40.0));
    assert_eq!(fused.landmarks.mesh_points, vec![Point3D::new(30.0, 40.0, 3.0)]);
}

#[test]
fn invalid_options_are_rejected_before_any_inference() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![face(0.0, 0.0, 10.0, 10.0, 0.9)]),
        MeshScript::default(),
    );

    let bad_threshold = FaceApiOptions {
        score_threshold: Some(1.5),
        ..Default::default()
    };
    let err = api.detect(&image(64, 64), Some(&bad_threshold)).unwrap_err();
    assert!(matches!(err, FaceError::InvalidOptions(_)));

    let no_faces = FaceApiOptions {
        max_faces: Some(0),
        ..Default::default()
    };
    let err = api
        .detect_with_landmarks(&image(64, 64), Some(&no_faces))
        .unwrap_err();
    assert!(matches!(err, FaceError::InvalidOptions(_)));

    assert_eq!(calls.faces.loads(), 0);
    assert_eq!(calls.faces.runs(), 0);
    assert_eq!(calls.mesh.runs(), 0);
    assert_eq!(api.options().score_threshold, None);

    let (backend, _) = fake_backend(FaceScript::default(), MeshScript::default());
    let err = FaceApi::new(no_faces, backend).err().unwrap();
    assert!(matches!(err, FaceError::InvalidOptions(_)));
}

#[test]
fn malformed_media_is_rejected_before_any_inference() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        FaceScript::default(),
        MeshScript::default(),
    );

    let four_channels = Media::Tensor(Array3::<u8>::zeros((8, 8, 4)));
    let err = api.detect(&four_channels, None).unwrap_err();
    assert!(matches!(err, FaceError::InvalidInput(_)));

    let err = api.detect(&image(0, 10), None).unwrap_err();
    assert!(matches!(err, FaceError::InvalidInput(_)));

    assert_eq!(calls.faces.runs(), 0);
}

#[test]
fn tensors_skip_downscaling() {
    let options = node(FaceApiOptions {
        downscale_width_threshold: Some(16),
        ..Default::default()
    });
    let (mut api, calls) = fake_api(
        options,
        faces(vec![face(1.0, 1.0, 8.0, 8.0, 0.9)]),
        MeshScript::default(),
    );

    let tensor = Media::Tensor(Array3::<u8>::zeros((24, 32, 3)));
    let result = api.detect(&tensor, None).unwrap();

    assert_eq!(calls.faces.inputs(), vec![(32, 24)]);
    assert_eq!(*result.faces[0].bbox(), BoundingBox::new(1.0, 1.0, 8.0, 8.0));
}

#[test]
fn disposed_api_refuses_work() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![face(0.0, 0.0, 10.0, 10.0, 0.9)]),
        meshes(vec![mesh_at(1.0, 1.0)]),
    );
    api.detect_with_landmarks(&image(64, 64), None).unwrap();

    api.dispose();
    api.dispose();
    assert!(api.is_disposed());
    assert_eq!(calls.faces.disposals(), 1);
    assert_eq!(calls.mesh.disposals(), 1);

    assert!(matches!(
        api.detect(&image(64, 64), None),
        Err(FaceError::ResourceDisposed)
    ));
    assert!(matches!(
        api.detect_with_landmarks(&image(64, 64), None),
        Err(FaceError::ResourceDisposed)
    ));
    assert!(matches!(
        api.update_options(&FaceApiOptions::default()),
        Err(FaceError::ResourceDisposed)
    ));
    assert!(matches!(api.initialize(), Err(FaceError::ResourceDisposed)));

    api.warmup();
    assert_eq!(calls.faces.runs(), 1);
    assert_eq!(calls.faces.loads(), 1);
}

#[test]
fn overrides_persist_for_later_calls() {
    let (mut api, _calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![
            face(0.0, 0.0, 10.0, 10.0, 0.9),
            face(20.0, 0.0, 10.0, 10.0, 0.8),
            face(40.0, 0.0, 10.0, 10.0, 0.4),
        ]),
        MeshScript::default(),
    );

    let all = api.detect(&image(64, 64), None).unwrap();
    assert_eq!(all.faces.len(), 2);

    let one = FaceApiOptions {
        max_faces: Some(1),
        ..Default::default()
    };
    assert_eq!(api.detect(&image(64, 64), Some(&one)).unwrap().faces.len(), 1);
    assert_eq!(api.options().max_faces, Some(1));
    assert_eq!(api.resolved_options().max_faces, 1);
    assert_eq!(api.resolved_options().max_landmark_faces, 1);
    assert_eq!(api.detect(&image(64, 64), None).unwrap().faces.len(), 1);
}

#[test]
fn downscale_override_applies_to_its_own_call() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![face(10.0, 10.0, 20.0, 20.0, 0.9)]),
        MeshScript::default(),
    );
    let downscale = FaceApiOptions {
        downscale_width_threshold: Some(320),
        ..Default::default()
    };

    let result = api.detect(&image(640, 480), Some(&downscale)).unwrap();

    assert_eq!(calls.faces.inputs(), vec![(320, 240)]);
    assert_eq!(
        *result.faces[0].bbox(),
        BoundingBox::new(20.0, 20.0, 40.0, 40.0)
    );
}

#[test]
fn models_load_once_and_rebuild_only_on_structural_changes() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![face(0.0, 0.0, 10.0, 10.0, 0.9)]),
        meshes(vec![mesh_at(1.0, 1.0)]),
    );

    api.detect_with_landmarks(&image(64, 64), None).unwrap();
    api.detect_with_landmarks(&image(64, 64), None).unwrap();
    assert_eq!(calls.faces.loads(), 1);
    assert_eq!(calls.mesh.loads(), 1);

    api.update_options(&FaceApiOptions {
        score_threshold: Some(0.7),
        ..Default::default()
    })
    .unwrap();
    api.detect(&image(64, 64), None).unwrap();
    assert_eq!(calls.faces.loads(), 1);

    api.update_options(&FaceApiOptions {
        max_faces: Some(4),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(calls.faces.disposals(), 1);
    assert_eq!(calls.faces.loads(), 1);
    api.detect_with_landmarks(&image(64, 64), None).unwrap();
    assert_eq!(calls.faces.loads(), 2);
    assert_eq!(calls.mesh.loads(), 2);

    api.update_options(&FaceApiOptions {
        refine_landmarks: Some(true),
        ..Default::default()
    })
    .unwrap();
    api.detect_with_landmarks(&image(64, 64), None).unwrap();
    assert_eq!(calls.faces.loads(), 2);
    assert_eq!(calls.mesh.loads(), 3);
}

#[test]
fn changing_environment_reselects_the_backend() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![face(0.0, 0.0, 10.0, 10.0, 0.9)]),
        MeshScript::default(),
    );
    assert_eq!(api.initialize().unwrap(), Environment::Node);
    assert_eq!(api.backend(), Some(Backend::Native));
    api.detect(&image(64, 64), None).unwrap();

    api.update_options(&FaceApiOptions {
        environment: Some(Environment::ReactNative),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(api.environment(), None);

    api.detect(&image(64, 64), None).unwrap();
    assert_eq!(api.environment(), Some(Environment::ReactNative));
    assert_eq!(api.backend(), Some(Backend::Accelerated));
    assert_eq!(calls.faces.loads(), 2);
}

struct CpuOnly;

impl BackendProbe for CpuOnly {
    fn activate(&self, backend: Backend) -> anyhow::Result<()> {
        match backend {
            Backend::Cpu => Ok(()),
            other => Err(anyhow!("{} not available", other)),
        }
    }
}

#[test]
fn unavailable_backends_fall_back_to_cpu() {
    let (mut backend, calls) = fake_backend(
        faces(vec![face(0.0, 0.0, 10.0, 10.0, 0.9)]),
        MeshScript::default(),
    );
    backend.probe = Box::new(CpuOnly);
    let options = FaceApiOptions {
        environment: Some(Environment::Browser),
        runtime: Some(Backend::Native),
        ..Default::default()
    };
    let mut api = FaceApi::new(options, backend).unwrap();

    let result = api.detect(&image(64, 64), None).unwrap();
    assert_eq!(result.faces.len(), 1);
    assert_eq!(api.environment(), Some(Environment::Browser));
    assert_eq!(api.backend(), Some(Backend::Cpu));
    assert_eq!(calls.faces.loads(), 1);
}

#[test]
fn failed_load_is_retried_on_the_next_call() {
    let script = FaceScript {
        faces: vec![face(0.0, 0.0, 10.0, 10.0, 0.9)],
        failing_loads: 1,
        ..Default::default()
    };
    let (mut api, calls) = fake_api(node(FaceApiOptions::default()), script, MeshScript::default());

    let err = api.detect(&image(64, 64), None).unwrap_err();
    assert!(matches!(
        err,
        FaceError::ModelInitializationFailed {
            model: "face detector",
            ..
        }
    ));

    assert_eq!(api.detect(&image(64, 64), None).unwrap().faces.len(), 1);
    assert_eq!(calls.faces.loads(), 2);
}

#[test]
fn inference_errors_surface_as_detection_failures() {
    let script = FaceScript {
        inference_error: Some("output tensor has the wrong rank"),
        ..Default::default()
    };
    let (mut api, _calls) = fake_api(node(FaceApiOptions::default()), script, MeshScript::default());

    let err = api.detect(&image(64, 64), None).unwrap_err();
    assert!(matches!(err, FaceError::DetectionFailed(_)));
}

#[test]
fn warmup_loads_both_models_and_swallows_failures() {
    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        FaceScript::default(),
        MeshScript::default(),
    );
    api.warmup();
    assert_eq!(calls.faces.inputs(), vec![(128, 128)]);
    assert_eq!(calls.mesh.inputs(), vec![(128, 128)]);

    let (mut api, calls) = fake_api(
        node(FaceApiOptions::default()),
        FaceScript {
            failing_loads: 1,
            ..Default::default()
        },
        MeshScript {
            failing_loads: 1,
            ..Default::default()
        },
    );
    api.warmup();
    assert_eq!(calls.faces.loads(), 1);
    assert_eq!(calls.mesh.loads(), 1);
    assert_eq!(calls.faces.runs(), 0);

    api.detect(&image(64, 64), None).unwrap();
    assert_eq!(calls.faces.loads(), 2);
}

#[test]
fn scores_fall_back_and_tracking_ids_need_tracking() {
    let mut unscored = RawFace::with_box(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    unscored.tracking_id = Some(7);
    let (mut api, _calls) = fake_api(
        node(FaceApiOptions::default()),
        faces(vec![unscored.clone()]),
        MeshScript::default(),
    );

    let result = api.detect(&image(64, 64), None).unwrap();
    assert_eq!(result.faces[0].score(), 0.95);
    assert_eq!(result.faces[0].tracking_id, None);

    let (mut api, _calls) = fake_api(
        node(FaceApiOptions {
            enable_tracking: Some(true),
            ..Default::default()
        }),
        faces(vec![unscored]),
        MeshScript::default(),
    );
    let result = api.detect(&image(64, 64), None).unwrap();
    assert_eq!(result.faces[0].tracking_id, Some(7));
}
